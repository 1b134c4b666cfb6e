//! Disconnection with fallback to a wired sink

use bluemgr_common::events::ManagerEvent;
use tracing::{info, warn};

use super::PairingWorkflow;
use crate::arbitrator::{fallback_priorities, select_target};
use crate::configurator::Activation;
use crate::error::{Error, Result};

/// What became of the output after a disconnect
#[derive(Debug)]
pub enum Fallback {
    Activated(Activation),
    /// No wired sink is present
    Unavailable,
    /// A wired sink could not be listed or activated
    Failed(Error),
}

impl Fallback {
    pub fn sink(&self) -> Option<&str> {
        match self {
            Fallback::Activated(activation) => Some(&activation.sink),
            _ => None,
        }
    }
}

impl PairingWorkflow {
    /// Disconnect the current Bluetooth device and activate the best
    /// non-Bluetooth sink
    ///
    /// The link is torn down before the fallback is attempted, so a fallback
    /// failure is reported through [`Fallback::Failed`] rather than as an
    /// error. Not serialized against pairing.
    pub async fn disconnect(&self) -> Fallback {
        let outcome = self.subsystems.bluetooth.disconnect().await;
        if !outcome.is_ok() {
            warn!(outcome = ?outcome, "Bluetooth disconnect reported failure");
        }

        self.sleeper.sleep(self.config.timings.fallback_settle).await;

        let fallback = match self.activate_fallback().await {
            Ok(Some(activation)) => Fallback::Activated(activation),
            Ok(None) => {
                warn!("No fallback sink available after disconnect");
                Fallback::Unavailable
            }
            Err(e) => {
                warn!("Fallback output could not be activated: {}", e);
                Fallback::Failed(e)
            }
        };

        self.events.emit_lossy(ManagerEvent::BluetoothDisconnected {
            fallback: fallback.sink().map(str::to_string),
            timestamp: chrono::Utc::now(),
        });

        fallback
    }

    async fn activate_fallback(&self) -> Result<Option<Activation>> {
        let listing = self.subsystems.audio.list_sinks().await?;
        let Some(target) = select_target(&listing, &fallback_priorities(&self.config.priorities))
        else {
            return Ok(None);
        };

        info!(sink = %target.sink, kind = %target.kind, "Falling back to wired output");
        let activation = self
            .configurator
            .activate(&target.sink, self.config.activation_volume)
            .await?;
        Ok(Some(activation))
    }
}
