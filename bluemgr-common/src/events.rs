//! Event types for the bluemgr event system
//!
//! Provides the shared event definitions and the EventBus used by the
//! arbitrator, the pairing workflow and the SSE endpoint.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::ActionStatus;
use crate::types::{BackendKind, Mac, PairingStage};

/// Audio manager event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ManagerEvent {
    /// The arbitrator made a different sink the default
    SinkSwitched {
        /// New default sink identifier
        sink: String,
        /// Backend class that won arbitration
        kind: BackendKind,
        /// Default sink before the switch (empty if none was set)
        previous: String,
        /// Volume applied to the new default, in percent
        volume: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pairing request entered a workflow stage
    PairingStageEntered {
        /// Identifies one pairing request
        session_id: Uuid,
        mac: Mac,
        stage: PairingStage,
        /// 1-based attempt number within the stage
        attempt: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A pairing request finished with a success, warning or error result
    PairingFinished {
        session_id: Uuid,
        mac: Mac,
        status: ActionStatus,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active Bluetooth link was torn down on request
    BluetoothDisconnected {
        /// Sink activated as fallback, if any
        fallback: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The audio server daemon was restarted on request
    AudioServerRestarted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ManagerEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ManagerEvent::SinkSwitched { .. } => "SinkSwitched",
            ManagerEvent::PairingStageEntered { .. } => "PairingStageEntered",
            ManagerEvent::PairingFinished { .. } => "PairingFinished",
            ManagerEvent::BluetoothDisconnected { .. } => "BluetoothDisconnected",
            ManagerEvent::AudioServerRestarted { .. } => "AudioServerRestarted",
        }
    }
}

/// Broadcast bus for [`ManagerEvent`]s
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ManagerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers
    ///   start missing old events
    ///
    /// # Examples
    ///
    /// ```
    /// use bluemgr_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Manager events are informational; nothing depends on delivery.
    pub fn emit_lossy(&self, event: ManagerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
