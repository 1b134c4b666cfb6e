//! Error types for bluemgr-am
//!
//! The first five variants are the failure taxonomy of the supervisory
//! loop and the pairing workflow. None of them is fatal to the process:
//! the arbitrator logs and skips the cycle, the pairing workflow retries or
//! downgrades the request to a weaker outcome.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bluemgr_common::api::ActionResult;
use bluemgr_common::PairingStage;
use thiserror::Error;

/// Main error type for bluemgr-am
#[derive(Error, Debug)]
pub enum Error {
    /// External command exceeded its time bound
    #[error("Command timed out: {command}")]
    CommandTimeout { command: String },

    /// External command exited non-zero (or could not be spawned)
    #[error("Command failed: {command}: {output}")]
    CommandFailed { command: String, output: String },

    /// Expected pattern absent from subsystem output
    #[error("Unexpected subsystem output: {0}")]
    ParseMiss(String),

    /// Retry budget of a pairing stage spent
    #[error("Stage {stage} exhausted after {attempts} attempts")]
    StageExhausted { stage: PairingStage, attempts: u32 },

    /// Bluetooth link is up but the audio server exposed no sink for it
    #[error("Bluetooth connected but no audio sink appeared for {mac}")]
    PartialActivation { mac: String },

    /// Malformed device address in a request
    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    /// Another pairing request holds the pairing lock
    #[error("A pairing request is already in progress")]
    PairingBusy,

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),
}

impl Error {
    /// HTTP status for an error reaching the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidMac(_) => StatusCode::BAD_REQUEST,
            Error::PairingBusy => StatusCode::CONFLICT,
            Error::CommandTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors answer with the same envelope as every action
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Error::PairingBusy => "Pairing already in progress".to_string(),
            Error::CommandFailed { command, .. } => format!("Command failed: {}", command),
            other => other.to_string(),
        };

        (status, Json(ActionResult::error(message))).into_response()
    }
}

/// Convenience Result type using bluemgr-am Error
pub type Result<T> = std::result::Result<T, Error>;
