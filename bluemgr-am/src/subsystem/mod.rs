//! Clients for the external subsystems
//!
//! Each client turns typed requests into command lines for the
//! [`CommandRunner`](crate::executor::CommandRunner) and hands raw output to
//! the [`parser`](crate::parser). Nothing outside this module builds
//! command lines.

pub mod audio;
pub mod bluetooth;

pub use audio::{AudioControl, BLUETOOTH_MODULES};
pub use bluetooth::BluetoothControl;

use std::sync::Arc;
use tracing::info;

use crate::executor::{CommandLine, CommandRunner};
use bluemgr_common::config::CommandsConfig;

/// Playback client service that must rebind after the default sink changes
#[derive(Clone)]
pub struct PlaybackService {
    runner: Arc<dyn CommandRunner>,
    unit: Option<String>,
    use_sudo: bool,
}

impl PlaybackService {
    /// `unit = None` disables restarts
    pub fn new(runner: Arc<dyn CommandRunner>, unit: Option<String>, use_sudo: bool) -> Self {
        Self {
            runner,
            unit,
            use_sudo,
        }
    }

    /// Restart the service; fire-and-forget
    pub fn restart(&self) {
        let Some(unit) = &self.unit else {
            return;
        };

        let cmd = if self.use_sudo {
            CommandLine::new("sudo").args(["systemctl", "restart", unit.as_str()])
        } else {
            CommandLine::new("systemctl").args(["restart", unit.as_str()])
        };

        info!(unit = %unit, "Restarting playback service");
        self.runner.spawn_detached(&cmd);
    }
}

/// All subsystem clients sharing one runner
#[derive(Clone)]
pub struct Subsystems {
    pub bluetooth: BluetoothControl,
    pub audio: AudioControl,
    pub playback: PlaybackService,
}

impl Subsystems {
    pub fn new(runner: Arc<dyn CommandRunner>, commands: &CommandsConfig) -> Self {
        let unit = Some(commands.playback_service.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string);

        Self {
            bluetooth: BluetoothControl::new(runner.clone(), commands.bluetoothctl.clone()),
            audio: AudioControl::new(runner.clone(), commands.pactl.clone(), commands.pulseaudio.clone()),
            playback: PlaybackService::new(runner, unit, commands.use_sudo),
        }
    }
}
