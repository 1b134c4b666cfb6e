//! # Bluetooth Audio Manager Common Library
//!
//! Shared code for the bluemgr services including:
//! - Domain types (devices, sinks, pairing stages)
//! - Action result envelope returned by every operation
//! - Event types (ManagerEvent enum) and the broadcast EventBus
//! - Configuration loading

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use api::{ActionResult, ActionStatus};
pub use error::{Error, Result};
pub use types::{BackendKind, ConnectionStatus, Device, Mac, PairingStage, Sink};
