//! Pairing and audio activation workflow
//!
//! Drives one Bluetooth device from "visible" to "active audio output".
//!
//! # Stages
//! PRECONDITIONS → RESET → TRUST → PAIR → CONNECT → AUDIO_SETTLE → SINK_WAIT → ACTIVATE
//!
//! - **PRECONDITIONS / RESET / TRUST / PAIR** (`phase_bluetooth.rs`):
//!   best-effort steps, failures are logged and the workflow continues
//! - **CONNECT** (`phase_bluetooth.rs`): bounded retry loop; exhaustion is
//!   the only hard failure, and removes the pairing record again
//! - **AUDIO_SETTLE / SINK_WAIT / ACTIVATE** (`phase_audio.rs`): the audio
//!   server's Bluetooth modules are reloaded so they notice the device, then
//!   the card is polled, given an A2DP profile, and its sink activated
//!
//! If Bluetooth connects but no sink appears, the request ends as a partial
//! activation (warning) rather than an error.
//!
//! Only one pairing request runs at a time; a concurrent request is rejected
//! with [`Error::PairingBusy`]. The arbitrator is not excluded and may act
//! between stages; every mutation here is idempotent.

use bluemgr_common::api::ActionResult;
use bluemgr_common::config::{PriorityEntry, TomlConfig};
use bluemgr_common::events::{EventBus, ManagerEvent};
use bluemgr_common::{Mac, PairingStage};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::configurator::SinkConfigurator;
use crate::error::{Error, Result};
use crate::retry::Sleeper;
use crate::subsystem::Subsystems;

mod disconnect;
mod phase_audio;
mod phase_bluetooth;

pub use disconnect::Fallback;

/// Settle delays between workflow steps
///
/// The Bluetooth stack and the audio server update their state
/// asynchronously; these are the waits observed to be long enough on
/// Raspberry Pi class hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct PairingTimings {
    pub reset_settle: Duration,
    pub trust_settle: Duration,
    pub pair_settle: Duration,
    pub disconnect_settle: Duration,
    pub connect_settle: Duration,
    pub connect_retry_delay: Duration,
    pub audio_settle: Duration,
    pub module_unload_settle: Duration,
    pub module_load_settle: Duration,
    pub sink_poll_interval: Duration,
    pub profile_backoff: Duration,
    pub profile_settle: Duration,
    pub service_restart_delay: Duration,
    pub fallback_settle: Duration,
}

impl Default for PairingTimings {
    fn default() -> Self {
        Self {
            reset_settle: Duration::from_secs(1),
            trust_settle: Duration::from_millis(500),
            pair_settle: Duration::from_secs(3),
            disconnect_settle: Duration::from_millis(500),
            connect_settle: Duration::from_secs(3),
            connect_retry_delay: Duration::from_secs(2),
            audio_settle: Duration::from_secs(3),
            module_unload_settle: Duration::from_secs(1),
            module_load_settle: Duration::from_secs(2),
            sink_poll_interval: Duration::from_secs(1),
            profile_backoff: Duration::from_millis(300),
            profile_settle: Duration::from_secs(1),
            service_restart_delay: Duration::from_secs(1),
            fallback_settle: Duration::from_secs(2),
        }
    }
}

/// Workflow settings
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub activation_volume: u8,
    pub connect_attempts: u32,
    pub sink_wait_polls: u32,
    /// Card profiles tried in order
    pub profiles: Vec<String>,
    /// Arbitration priorities; the disconnect fallback uses the non-Bluetooth ones
    pub priorities: Vec<PriorityEntry>,
    pub timings: PairingTimings,
}

impl WorkflowConfig {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            activation_volume: config.pairing.activation_volume,
            connect_attempts: config.pairing.connect_attempts,
            sink_wait_polls: config.pairing.sink_wait_polls,
            profiles: config.pairing.profiles.clone(),
            priorities: config.arbitration.priorities.clone(),
            timings: PairingTimings::default(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self::from_config(&TomlConfig::default())
    }
}

/// State of one pairing request; discarded when the request ends
#[derive(Debug)]
pub struct PairingSession {
    pub id: Uuid,
    pub target: Mac,
    stage: PairingStage,
    attempts: HashMap<PairingStage, u32>,
    started: Instant,
}

impl PairingSession {
    pub fn new(target: Mac) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            stage: PairingStage::Preconditions,
            attempts: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> PairingStage {
        self.stage
    }

    /// Attempts spent in a stage so far
    pub fn attempts(&self, stage: PairingStage) -> u32 {
        self.attempts.get(&stage).copied().unwrap_or(0)
    }

    /// Move to `stage`, recording how many attempts it took
    fn record(&mut self, stage: PairingStage, attempts: u32) {
        self.stage = stage;
        self.attempts.insert(stage, attempts);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// How a pairing request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Bluetooth connected and the sink is the active default
    Activated { sink: String, streams_moved: usize },
    /// Bluetooth connected but the audio server exposed no usable sink.
    /// Carries the card and sink listings at the time of giving up.
    PartialActivation { cards: String, sinks: String },
    /// Connect loop exhausted; pairing record removed
    ConnectFailed { attempts: u32 },
}

impl PairingOutcome {
    /// Error taxonomy entry for non-successful outcomes
    pub fn error(&self, mac: &Mac) -> Option<Error> {
        match self {
            PairingOutcome::Activated { .. } => None,
            PairingOutcome::PartialActivation { .. } => Some(Error::PartialActivation {
                mac: mac.to_string(),
            }),
            PairingOutcome::ConnectFailed { attempts } => Some(Error::StageExhausted {
                stage: PairingStage::Connect,
                attempts: *attempts,
            }),
        }
    }

    /// User-facing result; subsystem listings are never included
    pub fn to_action_result(&self) -> ActionResult {
        match self {
            PairingOutcome::Activated { sink, .. } => {
                ActionResult::success(format!("Connected and configured. Sink: {}", sink))
                    .with_data(json!({ "sink": sink }))
            }
            PairingOutcome::PartialActivation { .. } => ActionResult::warning(
                "Bluetooth connected, but audio was not configured. Try disconnecting and connecting again.",
            ),
            PairingOutcome::ConnectFailed { .. } => ActionResult::error(
                "Bluetooth connection failed. Check that the device is in pairing mode.",
            ),
        }
    }
}

/// The pairing state machine
pub struct PairingWorkflow {
    subsystems: Subsystems,
    configurator: SinkConfigurator,
    sleeper: Arc<dyn Sleeper>,
    config: WorkflowConfig,
    events: EventBus,
    lock: Mutex<()>,
}

impl PairingWorkflow {
    pub fn new(
        subsystems: Subsystems,
        configurator: SinkConfigurator,
        sleeper: Arc<dyn Sleeper>,
        config: WorkflowConfig,
        events: EventBus,
    ) -> Self {
        Self {
            subsystems,
            configurator,
            sleeper,
            config,
            events,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Whether a pairing request currently holds the lock
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Run the full workflow for one device
    ///
    /// Returns `Err(Error::PairingBusy)` if another request is running; every
    /// other failure is folded into the returned [`PairingOutcome`].
    pub async fn pair(&self, mac: &Mac) -> Result<PairingOutcome> {
        let _guard = self.lock.try_lock().map_err(|_| Error::PairingBusy)?;

        let mut session = PairingSession::new(mac.clone());
        info!(session_id = %session.id, mac = %mac, "Starting pairing");

        self.phase_preconditions(&mut session).await;
        self.phase_reset(&mut session).await;
        self.phase_trust(&mut session).await;
        self.phase_pair(&mut session).await;

        let outcome = match self.phase_connect(&mut session).await {
            Err(attempts) => {
                self.subsystems.bluetooth.remove(mac).await;
                PairingOutcome::ConnectFailed { attempts }
            }
            Ok(()) => {
                self.phase_audio_settle(&mut session).await;
                match self.phase_sink_wait(&mut session).await {
                    Some(sink) => self.phase_activate(&mut session, &sink).await,
                    None => self.partial_activation(&session).await,
                }
            }
        };

        self.finish(&session, &outcome);
        Ok(outcome)
    }

    fn finish(&self, session: &PairingSession, outcome: &PairingOutcome) {
        let result = outcome.to_action_result();

        match outcome.error(&session.target) {
            None => info!(
                session_id = %session.id,
                mac = %session.target,
                elapsed_secs = session.elapsed().as_secs_f32(),
                "Pairing finished: {}",
                result.message
            ),
            Some(e) => warn!(
                session_id = %session.id,
                mac = %session.target,
                stage = %session.stage(),
                elapsed_secs = session.elapsed().as_secs_f32(),
                "Pairing finished: {}",
                e
            ),
        }

        self.events.emit_lossy(ManagerEvent::PairingFinished {
            session_id: session.id,
            mac: session.target.clone(),
            status: result.status,
            message: result.message,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Log and broadcast entry into a stage attempt
    fn announce(&self, session_id: Uuid, mac: &Mac, stage: PairingStage, attempt: u32) {
        info!(session_id = %session_id, mac = %mac, stage = %stage, attempt, "Pairing stage");
        self.events.emit_lossy(ManagerEvent::PairingStageEntered {
            session_id,
            mac: mac.clone(),
            stage,
            attempt,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Single-attempt stage entry
    fn enter(&self, session: &mut PairingSession, stage: PairingStage) {
        session.record(stage, 1);
        self.announce(session.id, &session.target, stage, 1);
    }
}
