//! Boundary operations of the audio manager
//!
//! [`AudioManager`] is what the HTTP layer talks to. Listing operations
//! return typed data; actions return an [`ActionResult`].

use bluemgr_common::api::ActionResult;
use bluemgr_common::config::{PriorityEntry, TomlConfig};
use bluemgr_common::events::{EventBus, ManagerEvent};
use bluemgr_common::{BackendKind, ConnectionStatus, Device, Mac};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::configurator::SinkConfigurator;
use crate::error::{Error, Result};
use crate::executor::CommandRunner;
use crate::pairing::{Fallback, PairingWorkflow, WorkflowConfig};
use crate::parser;
use crate::retry::Sleeper;
use crate::subsystem::Subsystems;

/// Wait between stopping and starting the audio server, and after starting it
const AUDIO_RESTART_SETTLE: Duration = Duration::from_secs(2);

/// Raw subsystem listings for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub bluetooth_info: String,
    pub paired_devices: String,
    pub pulseaudio_cards: String,
    pub pulseaudio_sinks: String,
    /// Bluetooth-related lines of the module listing
    pub pulseaudio_modules: String,
    pub default_sink: String,
    pub sink_inputs: String,
}

/// A sink as reported by `GET /sinks`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkEntry {
    pub identifier: String,
    pub kind: BackendKind,
    pub default: bool,
}

pub struct AudioManager {
    subsystems: Subsystems,
    workflow: PairingWorkflow,
    sleeper: Arc<dyn Sleeper>,
    events: EventBus,
    priorities: Vec<PriorityEntry>,
    scan_duration: Duration,
}

impl AudioManager {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sleeper: Arc<dyn Sleeper>,
        config: &TomlConfig,
        events: EventBus,
    ) -> Self {
        let subsystems = Subsystems::new(runner, &config.commands);
        let configurator = SinkConfigurator::new(subsystems.audio.clone());
        let workflow = PairingWorkflow::new(
            subsystems.clone(),
            configurator,
            sleeper.clone(),
            WorkflowConfig::from_config(config),
            events.clone(),
        );

        Self {
            subsystems,
            workflow,
            sleeper,
            events,
            priorities: config.arbitration.priorities.clone(),
            scan_duration: Duration::from_secs(config.pairing.scan_secs),
        }
    }

    pub fn subsystems(&self) -> &Subsystems {
        &self.subsystems
    }

    pub fn workflow(&self) -> &PairingWorkflow {
        &self.workflow
    }

    /// Load the audio server's Bluetooth modules where missing; failures are
    /// logged only
    pub async fn ensure_modules(&self) {
        match self.subsystems.audio.ensure_bluetooth_modules().await {
            Ok(loaded) if !loaded.is_empty() => info!(?loaded, "Loaded Bluetooth audio modules"),
            Ok(_) => {}
            Err(e) => warn!("Could not ensure Bluetooth audio modules: {}", e),
        }
    }

    /// Discover nearby devices for the configured scan window
    pub async fn scan(&self) -> Result<Vec<Device>> {
        self.ensure_modules().await;

        let bluetooth = &self.subsystems.bluetooth;
        bluetooth.set_scanning(true);
        self.sleeper.sleep(self.scan_duration).await;
        bluetooth.set_scanning(false);

        let devices = bluetooth.devices().await?;
        info!(count = devices.len(), "Scan finished");
        Ok(devices)
    }

    pub async fn paired(&self) -> Result<Vec<Device>> {
        self.subsystems.bluetooth.paired_devices().await
    }

    pub async fn connection_status(&self) -> Result<ConnectionStatus> {
        self.subsystems.bluetooth.connection_status().await
    }

    /// Run the pairing workflow
    ///
    /// Fails with [`Error::InvalidMac`] before touching any subsystem, and
    /// with [`Error::PairingBusy`] while another request runs.
    pub async fn pair(&self, mac: &str) -> Result<ActionResult> {
        let mac = parse_mac(mac)?;
        let outcome = self.workflow.pair(&mac).await?;
        Ok(outcome.to_action_result())
    }

    /// Disconnect and fall back to a wired sink
    pub async fn disconnect(&self) -> ActionResult {
        info!("Disconnecting Bluetooth");

        match self.workflow.disconnect().await {
            Fallback::Activated(activation) => ActionResult::success("Disconnected")
                .with_data(json!({ "fallback": activation.sink })),
            Fallback::Unavailable => ActionResult::success("Disconnected"),
            Fallback::Failed(_) => {
                ActionResult::warning("Disconnected, but no output could be activated")
            }
        }
    }

    /// Drop the pairing record of a device
    pub async fn remove(&self, mac: &str) -> Result<ActionResult> {
        let mac = parse_mac(mac)?;
        let outcome = self.subsystems.bluetooth.remove(&mac).await;

        if outcome.is_ok() {
            info!(mac = %mac, "Device removed");
            Ok(ActionResult::success(format!("Device {} removed", mac)))
        } else {
            warn!(mac = %mac, outcome = ?outcome, "Remove reported failure");
            Ok(ActionResult::warning(format!("Device {} could not be removed", mac)))
        }
    }

    /// Collect raw listings from both subsystems
    ///
    /// A failing listing is reported in place of its text.
    pub async fn debug_snapshot(&self) -> DebugSnapshot {
        let bluetooth = &self.subsystems.bluetooth;
        let audio = &self.subsystems.audio;

        DebugSnapshot {
            bluetooth_info: text_or_error(bluetooth.info(None).await),
            paired_devices: text_or_error(bluetooth.paired_listing().await),
            pulseaudio_cards: text_or_error(audio.list_cards().await),
            pulseaudio_sinks: text_or_error(audio.list_sinks().await),
            pulseaudio_modules: text_or_error(
                audio
                    .list_modules()
                    .await
                    .map(|modules| parser::filter_lines(&modules, "bluetooth")),
            ),
            default_sink: text_or_error(audio.default_sink().await),
            sink_inputs: text_or_error(audio.list_streams().await),
        }
    }

    /// Restart the audio server daemon and reload its Bluetooth modules
    pub async fn restart_audio(&self) -> ActionResult {
        info!("Restarting audio server");
        let audio = &self.subsystems.audio;

        let stopped = audio.stop_server().await;
        if !stopped.is_ok() {
            warn!(outcome = ?stopped, "Audio server stop reported failure");
        }
        self.sleeper.sleep(AUDIO_RESTART_SETTLE).await;

        let started = audio.start_server().await;
        if !started.is_ok() {
            warn!(outcome = ?started, "Audio server start reported failure");
        }
        self.sleeper.sleep(AUDIO_RESTART_SETTLE).await;

        self.ensure_modules().await;

        self.events.emit_lossy(ManagerEvent::AudioServerRestarted {
            timestamp: chrono::Utc::now(),
        });

        if started.is_ok() {
            ActionResult::success("Audio server restarted")
        } else {
            ActionResult::warning("Audio server did not report a successful start")
        }
    }

    /// Current sinks, classified, with the default flagged
    pub async fn sinks(&self) -> Result<Vec<SinkEntry>> {
        let audio = &self.subsystems.audio;
        let listing = audio.list_sinks().await?;
        let default = audio.default_sink().await.unwrap_or_default();

        Ok(parser::parse_sinks(&listing, &self.priorities)
            .into_iter()
            .map(|sink| SinkEntry {
                default: sink.identifier == default,
                identifier: sink.identifier,
                kind: sink.kind,
            })
            .collect())
    }
}

fn parse_mac(input: &str) -> Result<Mac> {
    input
        .parse::<Mac>()
        .map_err(|_| Error::InvalidMac(input.to_string()))
}

fn text_or_error(result: Result<String>) -> String {
    result.unwrap_or_else(|e| format!("Error: {}", e))
}
