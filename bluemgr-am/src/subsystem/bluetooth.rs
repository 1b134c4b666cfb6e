//! Bluetooth stack control via `bluetoothctl`

use bluemgr_common::{ConnectionStatus, Device, Mac};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::{CommandLine, CommandOutcome, CommandRunner};
use crate::parser;

/// Typed operations on the Bluetooth stack
#[derive(Clone)]
pub struct BluetoothControl {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl BluetoothControl {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn command<I, S>(&self, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::new(self.program.clone()).args(args)
    }

    /// Toggle discovery; fire-and-forget
    pub fn set_scanning(&self, enabled: bool) {
        let state = if enabled { "on" } else { "off" };
        self.runner.spawn_detached(&self.command(["scan", state]));
    }

    /// Devices known to the stack (discovered or paired)
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let cmd = self.command(["devices"]);
        let text = self.runner.execute(&cmd).await.into_result(&cmd)?;
        Ok(parser::parse_devices(&text))
    }

    pub async fn paired_devices(&self) -> Result<Vec<Device>> {
        let text = self.paired_listing().await?;
        Ok(parser::parse_devices(&text))
    }

    /// Unparsed `paired-devices` output
    pub async fn paired_listing(&self) -> Result<String> {
        let cmd = self.command(["paired-devices"]);
        self.runner.execute(&cmd).await.into_result(&cmd)
    }

    /// Raw info block for a device, or for the current default device
    ///
    /// The stack exits non-zero when no device is available but still prints
    /// a diagnostic, so failed output is returned as text too.
    pub async fn info(&self, mac: Option<&Mac>) -> Result<String> {
        let cmd = match mac {
            Some(mac) => self.command(["info", mac.as_str()]),
            None => self.command(["info"]),
        };

        match self.runner.execute(&cmd).await {
            CommandOutcome::Ok(text) | CommandOutcome::Failed(text) => Ok(text),
            CommandOutcome::TimedOut => Err(Error::CommandTimeout {
                command: cmd.to_string(),
            }),
        }
    }

    pub async fn connection_status(&self) -> Result<ConnectionStatus> {
        let text = self.info(None).await?;
        Ok(parser::parse_connection_info(&text))
    }

    /// Whether the stack reports the device as connected
    ///
    /// A timed-out query counts as not connected.
    pub async fn is_connected(&self, mac: &Mac) -> bool {
        match self.info(Some(mac)).await {
            Ok(text) => parser::reports_connected(&text),
            Err(e) => {
                warn!(mac = %mac, "Device info query failed: {}", e);
                false
            }
        }
    }

    pub async fn trust(&self, mac: &Mac) -> CommandOutcome {
        self.device_command("trust", mac).await
    }

    pub async fn pair(&self, mac: &Mac) -> CommandOutcome {
        self.device_command("pair", mac).await
    }

    pub async fn connect(&self, mac: &Mac) -> CommandOutcome {
        self.device_command("connect", mac).await
    }

    /// Remove the pairing record of a device
    pub async fn remove(&self, mac: &Mac) -> CommandOutcome {
        self.device_command("remove", mac).await
    }

    /// Disconnect whatever device is currently connected
    pub async fn disconnect(&self) -> CommandOutcome {
        let cmd = self.command(["disconnect"]);
        let outcome = self.runner.execute(&cmd).await;
        debug!(outcome = ?outcome, "bluetoothctl disconnect");
        outcome
    }

    async fn device_command(&self, verb: &str, mac: &Mac) -> CommandOutcome {
        let cmd = self.command([verb, mac.as_str()]);
        let outcome = self.runner.execute(&cmd).await;
        debug!(mac = %mac, verb, outcome = ?outcome, "bluetoothctl device command");
        outcome
    }
}
