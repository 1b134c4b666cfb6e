//! Audio sink activation
//!
//! Makes a sink the default, applies the volume/mute policy and moves the
//! active streams onto it. Every step is idempotent, so the arbitrator and
//! the pairing workflow can both activate the same sink without coordination.
//!
//! Stream migration is not atomic: a stream created after the listing stays
//! where it is until the next activation.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::subsystem::AudioControl;

/// What an activation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub sink: String,
    pub volume: u8,
    pub streams_moved: usize,
    pub streams_failed: usize,
}

#[derive(Clone)]
pub struct SinkConfigurator {
    audio: AudioControl,
}

impl SinkConfigurator {
    pub fn new(audio: AudioControl) -> Self {
        Self { audio }
    }

    /// Make `sink` the default at `volume` percent, unmuted, carrying all
    /// active streams
    ///
    /// Only failing to set the default sink is an error; volume, mute and
    /// per-stream failures are logged and the activation continues.
    pub async fn activate(&self, sink: &str, volume: u8) -> Result<Activation> {
        info!(sink, volume, "Activating sink");

        self.audio.set_default_sink(sink).await?;

        if let Err(e) = self.audio.set_volume(sink, volume).await {
            warn!(sink, "Failed to set volume: {}", e);
        }
        if let Err(e) = self.audio.unmute(sink).await {
            warn!(sink, "Failed to unmute: {}", e);
        }

        let (streams_moved, streams_failed) = self.migrate_streams(sink).await;

        Ok(Activation {
            sink: sink.to_string(),
            volume,
            streams_moved,
            streams_failed,
        })
    }

    async fn migrate_streams(&self, sink: &str) -> (usize, usize) {
        let ids = match self.audio.stream_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(sink, "Failed to list streams: {}", e);
                return (0, 0);
            }
        };

        let mut moved = 0;
        let mut failed = 0;
        for id in &ids {
            match self.audio.move_stream(id, sink).await {
                Ok(()) => moved += 1,
                Err(e) => {
                    // Stream may have ended since the listing
                    debug!(stream = %id, "Failed to move stream: {}", e);
                    failed += 1;
                }
            }
        }

        if !ids.is_empty() {
            info!(sink, moved, failed, "Migrated streams");
        }
        (moved, failed)
    }
}
