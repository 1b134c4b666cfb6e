//! Shared API response types
//!
//! Every boundary operation of the audio manager answers with an
//! [`ActionResult`]: a status, a human-readable message and optional
//! structured data. Raw subsystem text never goes into `message`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ========================================
// Result Envelope
// ========================================

/// Outcome class of a boundary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    /// Operation partially succeeded (e.g. Bluetooth connected but no audio sink)
    Warning,
    Error,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Warning => "warning",
            ActionStatus::Error => "error",
        }
    }
}

/// Structured result returned by every manager operation
///
/// # Examples
///
/// ```
/// use bluemgr_common::api::{ActionResult, ActionStatus};
///
/// let result = ActionResult::success("Disconnected");
/// assert_eq!(result.status, ActionStatus::Success);
/// assert!(result.data.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub status: ActionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ActionStatus::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ActionStatus::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ActionStatus::Error, message)
    }

    fn new(status: ActionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data to the result
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
