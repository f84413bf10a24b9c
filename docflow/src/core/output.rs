//! Stage output type with factory methods.

use super::StageStatus;
use crate::errors::ErrorInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a single `execute` call reports back to the engine.
///
/// The engine turns this into a [`StageOutcome`](super::StageOutcome) by
/// adding the stage name, attempt count and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the attempt.
    pub status: StageStatus,

    /// Error details (for failed attempts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,

    /// Additional metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for StageOutput {
    fn default() -> Self {
        Self::ok()
    }
}

impl StageOutput {
    /// Creates a successful output.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: StageStatus::Ok,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Creates a successful output carrying metadata.
    #[must_use]
    pub fn ok_with(metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            status: StageStatus::Ok,
            error: None,
            metadata,
        }
    }

    /// Creates a retryable failure with a message.
    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self::fail_with(ErrorInfo::stage_failed(message))
    }

    /// Creates a failure that retrying cannot fix.
    #[must_use]
    pub fn fail_permanent(message: impl Into<String>) -> Self {
        Self::fail_with(ErrorInfo::stage_failed(message).permanent())
    }

    /// Creates a failure from full error details.
    #[must_use]
    pub fn fail_with(error: ErrorInfo) -> Self {
        Self {
            status: StageStatus::Fail,
            error: Some(error),
            metadata: HashMap::new(),
        }
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the attempt succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the attempt failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns true if a failed attempt may be retried.
    ///
    /// A failure without error details is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_failure() && self.error.as_ref().map_or(true, |e| e.retryable)
    }
}

impl From<anyhow::Result<()>> for StageOutput {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(err) => Self::fail_with(ErrorInfo::from_anyhow(&err)),
        }
    }
}
