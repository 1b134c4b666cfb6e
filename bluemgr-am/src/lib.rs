//! bluemgr-am (Audio Manager) library
//!
//! Keeps the best available audio output authoritative on a small Linux
//! machine and drives Bluetooth speakers from discovery to active output.
//! All subsystem access goes through external command-line tools.

pub mod api;
pub mod arbitrator;
pub mod configurator;
pub mod error;
pub mod executor;
pub mod manager;
pub mod pairing;
pub mod parser;
pub mod retry;
pub mod subsystem;

pub use error::{Error, Result};
