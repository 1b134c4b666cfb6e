//! Priority arbitration loop
//!
//! Keeps the highest-priority available sink as the audio server default.
//!
//! # Cycle
//! IDLE → EVALUATING → (SWITCHING | IDLE), every `period`.
//!
//! - **EVALUATING**: list sinks and read the current default. Priority
//!   classes are tried in order; a case-insensitive substring test over the
//!   raw listing decides whether a class is present, then the prefix search
//!   resolves its sink identifier. Presence without a resolvable identifier
//!   yields no target for that cycle rather than falling through to the
//!   next class.
//! - **SWITCHING**: only when the target differs from the current default.
//!
//! State is re-read from the audio server at the start of every cycle, so a
//! concurrent pairing request that changed the default is observed before
//! any mutation. A failed cycle is logged and the loop carries on.

use bluemgr_common::config::{ArbitrationConfig, PriorityEntry};
use bluemgr_common::events::{EventBus, ManagerEvent};
use bluemgr_common::BackendKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::configurator::SinkConfigurator;
use crate::error::Result;
use crate::parser;
use crate::subsystem::AudioControl;

/// Sink chosen by arbitration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: BackendKind,
    pub sink: String,
}

/// Result of one evaluation cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No sink matches any priority class
    NoCandidate,
    /// Target already is the default; nothing done
    AlreadyDefault(Target),
    Switched { target: Target, previous: String },
}

/// Pick the highest-priority sink present in a `pactl list sinks short` listing
pub fn select_target(listing: &str, priorities: &[PriorityEntry]) -> Option<Target> {
    let entry = priorities
        .iter()
        .find(|p| parser::contains_fragment(listing, &p.prefix))?;

    let sink = parser::find_sink_by_prefix(&entry.prefix, listing)?;
    Some(Target {
        kind: entry.kind,
        sink,
    })
}

/// Priorities usable while a Bluetooth link is being torn down
pub fn fallback_priorities(priorities: &[PriorityEntry]) -> Vec<PriorityEntry> {
    priorities
        .iter()
        .filter(|p| p.kind != BackendKind::Bluetooth)
        .cloned()
        .collect()
}

/// Arbitration settings
#[derive(Debug, Clone)]
pub struct ArbitratorConfig {
    pub period: Duration,
    pub takeover_volume: u8,
    /// Highest priority first
    pub priorities: Vec<PriorityEntry>,
}

impl From<&ArbitrationConfig> for ArbitratorConfig {
    fn from(config: &ArbitrationConfig) -> Self {
        Self {
            period: Duration::from_secs(config.period_secs),
            takeover_volume: config.takeover_volume,
            priorities: config.priorities.clone(),
        }
    }
}

/// Long-lived arbitration service
pub struct Arbitrator {
    audio: AudioControl,
    configurator: SinkConfigurator,
    config: ArbitratorConfig,
    events: EventBus,
}

impl Arbitrator {
    pub fn new(
        audio: AudioControl,
        configurator: SinkConfigurator,
        config: ArbitratorConfig,
        events: EventBus,
    ) -> Self {
        Self {
            audio,
            configurator,
            config,
            events,
        }
    }

    pub fn config(&self) -> &ArbitratorConfig {
        &self.config
    }

    /// Run one EVALUATING step and, if needed, one SWITCHING step
    pub async fn evaluate_once(&self) -> Result<CycleOutcome> {
        let listing = self.audio.list_sinks().await?;
        let current = self.audio.default_sink().await?;

        let Some(target) = select_target(&listing, &self.config.priorities) else {
            return Ok(CycleOutcome::NoCandidate);
        };

        if target.sink == current {
            return Ok(CycleOutcome::AlreadyDefault(target));
        }

        info!(
            sink = %target.sink,
            kind = %target.kind,
            previous = %current,
            "Switching default sink"
        );
        self.configurator
            .activate(&target.sink, self.config.takeover_volume)
            .await?;

        self.events.emit_lossy(ManagerEvent::SinkSwitched {
            sink: target.sink.clone(),
            kind: target.kind,
            previous: current.clone(),
            volume: self.config.takeover_volume,
            timestamp: chrono::Utc::now(),
        });

        Ok(CycleOutcome::Switched {
            target,
            previous: current,
        })
    }

    /// Evaluate every `period` until `shutdown` is cancelled
    ///
    /// A cycle in progress completes before shutdown takes effect.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            period_secs = self.config.period.as_secs_f32(),
            classes = self.config.priorities.len(),
            "Priority arbitration started"
        );

        let mut ticker = tokio::time::interval(self.config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.evaluate_once().await {
                Ok(CycleOutcome::Switched { .. }) => {}
                Ok(outcome) => debug!(?outcome, "Arbitration cycle"),
                Err(e) => warn!("Arbitration cycle failed: {}", e),
            }
        }

        info!("Priority arbitration stopped");
    }

    /// Start the loop as a background task
    pub fn spawn(self: Arc<Self>) -> ArbitratorHandle {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run(shutdown.clone()));
        ArbitratorHandle { shutdown, task }
    }
}

/// Lifecycle handle of a spawned [`Arbitrator`]
pub struct ArbitratorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ArbitratorHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Arbitration task ended abnormally: {}", e);
        }
    }
}
