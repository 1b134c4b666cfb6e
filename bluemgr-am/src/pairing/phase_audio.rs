//! Audio-side stages: AUDIO_SETTLE, SINK_WAIT, ACTIVATE

use bluemgr_common::{Mac, PairingStage};
use tracing::{debug, info, warn};

use super::{PairingOutcome, PairingSession, PairingWorkflow};
use crate::error::{Error, Result};
use crate::parser;
use crate::retry::RetryPolicy;
use crate::subsystem::BLUETOOTH_MODULES;

impl PairingWorkflow {
    /// AUDIO_SETTLE: wait, then reload the Bluetooth modules so the audio
    /// server picks up the new link
    pub(super) async fn phase_audio_settle(&self, session: &mut PairingSession) {
        self.enter(session, PairingStage::AudioSettle);

        let timings = &self.config.timings;
        let audio = &self.subsystems.audio;

        self.sleeper.sleep(timings.audio_settle).await;

        for module in BLUETOOTH_MODULES {
            audio.unload_module(module).await;
        }
        self.sleeper.sleep(timings.module_unload_settle).await;

        for module in BLUETOOTH_MODULES {
            let outcome = audio.load_module(module).await;
            if !outcome.is_ok() {
                warn!(module, outcome = ?outcome, "Module reload failed");
            }
        }
        self.sleeper.sleep(timings.module_load_settle).await;
    }

    /// SINK_WAIT: poll for the device's card, give it an A2DP profile and
    /// look for its sink
    pub(super) async fn phase_sink_wait(&self, session: &mut PairingSession) -> Option<String> {
        let policy = RetryPolicy::fixed(
            self.config.sink_wait_polls,
            self.config.timings.sink_poll_interval,
        );
        let id = session.id;
        let mac = session.target.clone();
        let mac = &mac;

        let result = policy
            .run(self.sleeper.as_ref(), |poll| async move {
                self.announce(id, mac, PairingStage::SinkWait, poll);
                match self.poll_for_sink(mac).await {
                    Ok(sink) => Some((sink, poll)),
                    Err(e) => {
                        debug!(poll, "Audio not ready: {}", e);
                        None
                    }
                }
            })
            .await;

        match result {
            Ok((sink, poll)) => {
                session.record(PairingStage::SinkWait, poll);
                info!(sink = %sink, poll, "Bluetooth sink available");
                Some(sink)
            }
            Err(exhausted) => {
                session.record(PairingStage::SinkWait, exhausted.attempts);
                None
            }
        }
    }

    async fn poll_for_sink(&self, mac: &Mac) -> Result<String> {
        let audio = &self.subsystems.audio;

        let cards = audio.list_cards().await?;
        let card = parser::find_card_for_mac(mac, &cards)
            .ok_or_else(|| Error::ParseMiss(format!("no audio card for {}", mac)))?;

        match self.select_profile(&card).await {
            Some(profile) => debug!(card = %card, profile = %profile, "Card profile set"),
            None => debug!(card = %card, "No profile accepted"),
        }
        self.sleeper.sleep(self.config.timings.profile_settle).await;

        let sinks = audio.list_sinks().await?;
        parser::find_sink_for_mac(mac, &sinks)
            .ok_or_else(|| Error::ParseMiss(format!("no audio sink for {}", mac)))
    }

    /// Try each configured profile until the server accepts one
    async fn select_profile(&self, card: &str) -> Option<String> {
        let profiles = &self.config.profiles;
        let policy = RetryPolicy::fixed(profiles.len() as u32, self.config.timings.profile_backoff);

        policy
            .run(self.sleeper.as_ref(), |n| async move {
                let profile = profiles.get(n as usize - 1)?;
                self.subsystems
                    .audio
                    .set_card_profile(card, profile)
                    .await
                    .then(|| profile.clone())
            })
            .await
            .ok()
    }

    /// ACTIVATE: make the sink the default, then restart the playback client
    pub(super) async fn phase_activate(&self, session: &mut PairingSession, sink: &str) -> PairingOutcome {
        self.enter(session, PairingStage::Activate);

        match self.configurator.activate(sink, self.config.activation_volume).await {
            Ok(activation) => {
                self.sleeper.sleep(self.config.timings.service_restart_delay).await;
                self.subsystems.playback.restart();
                PairingOutcome::Activated {
                    sink: activation.sink,
                    streams_moved: activation.streams_moved,
                }
            }
            Err(e) => {
                warn!(sink, "Activation failed: {}", e);
                self.partial_activation(session).await
            }
        }
    }

    /// Snapshot card and sink listings for a partial activation
    pub(super) async fn partial_activation(&self, session: &PairingSession) -> PairingOutcome {
        let audio = &self.subsystems.audio;
        let cards = audio
            .list_cards()
            .await
            .unwrap_or_else(|e| format!("<{}>", e));
        let sinks = audio
            .list_sinks()
            .await
            .unwrap_or_else(|e| format!("<{}>", e));

        warn!(
            mac = %session.target,
            polls = session.attempts(PairingStage::SinkWait),
            "No audio sink for connected device\ncards:\n{}\nsinks:\n{}",
            cards.trim_end(),
            sinks.trim_end()
        );

        PairingOutcome::PartialActivation { cards, sinks }
    }
}
