//! Bluetooth-side stages: PRECONDITIONS, RESET, TRUST, PAIR, CONNECT

use bluemgr_common::{Mac, PairingStage};
use tracing::{debug, info, warn};

use super::{PairingSession, PairingWorkflow};
use crate::executor::CommandOutcome;
use crate::retry::RetryPolicy;

/// Short excerpt of command output for log lines
fn excerpt(outcome: &CommandOutcome) -> String {
    match outcome.text() {
        Some(text) => text.trim().chars().take(100).collect(),
        None => "timed out".to_string(),
    }
}

impl PairingWorkflow {
    /// PRECONDITIONS: audio server Bluetooth modules loaded
    pub(super) async fn phase_preconditions(&self, session: &mut PairingSession) {
        self.enter(session, PairingStage::Preconditions);

        match self.subsystems.audio.ensure_bluetooth_modules().await {
            Ok(loaded) if !loaded.is_empty() => info!(?loaded, "Loaded missing audio modules"),
            Ok(_) => {}
            Err(e) => warn!("Could not check audio modules: {}", e),
        }
    }

    /// RESET: drop any stale pairing record
    pub(super) async fn phase_reset(&self, session: &mut PairingSession) {
        self.enter(session, PairingStage::Reset);

        let outcome = self.subsystems.bluetooth.remove(&session.target).await;
        debug!(outcome = %excerpt(&outcome), "Removed previous pairing");
        self.sleeper.sleep(self.config.timings.reset_settle).await;
    }

    pub(super) async fn phase_trust(&self, session: &mut PairingSession) {
        self.enter(session, PairingStage::Trust);

        let outcome = self.subsystems.bluetooth.trust(&session.target).await;
        if !outcome.is_ok() {
            warn!(mac = %session.target, "Trust failed: {}", excerpt(&outcome));
        }
        self.sleeper.sleep(self.config.timings.trust_settle).await;
    }

    /// PAIR: a failure here often means "already paired"; CONNECT decides
    pub(super) async fn phase_pair(&self, session: &mut PairingSession) {
        self.enter(session, PairingStage::Pair);

        let outcome = self.subsystems.bluetooth.pair(&session.target).await;
        if !outcome.is_ok() {
            info!(mac = %session.target, "Pair did not succeed: {}", excerpt(&outcome));
        }
        self.sleeper.sleep(self.config.timings.pair_settle).await;
    }

    /// CONNECT: retry until the device reports a live link
    ///
    /// Returns the number of attempts spent when the budget runs out.
    pub(super) async fn phase_connect(&self, session: &mut PairingSession) -> Result<(), u32> {
        let policy = RetryPolicy::fixed(
            self.config.connect_attempts,
            self.config.timings.connect_retry_delay,
        );
        let id = session.id;
        let mac = session.target.clone();
        let mac = &mac;

        let result = policy
            .run(self.sleeper.as_ref(), |attempt| async move {
                self.announce(id, mac, PairingStage::Connect, attempt);
                self.connect_attempt(mac, attempt).await.then_some(attempt)
            })
            .await;

        match result {
            Ok(attempt) => {
                session.record(PairingStage::Connect, attempt);
                info!(mac = %mac, attempt, "Bluetooth connected");
                Ok(())
            }
            Err(exhausted) => {
                session.record(PairingStage::Connect, exhausted.attempts);
                Err(exhausted.attempts)
            }
        }
    }

    /// One disconnect/connect cycle followed by a status check
    async fn connect_attempt(&self, mac: &Mac, attempt: u32) -> bool {
        let bluetooth = &self.subsystems.bluetooth;
        let timings = &self.config.timings;

        bluetooth.disconnect().await;
        self.sleeper.sleep(timings.disconnect_settle).await;

        let outcome = bluetooth.connect(mac).await;
        debug!(attempt, "Connect result: {}", excerpt(&outcome));
        self.sleeper.sleep(timings.connect_settle).await;

        let connected = bluetooth.is_connected(mac).await;
        if !connected {
            warn!(mac = %mac, attempt, "Device not connected");
        }
        connected
    }
}
