//! Error types for the docflow engine.
//!
//! Stage failures are ordinary data ([`ErrorInfo`] inside a
//! [`StageOutcome`](crate::core::StageOutcome)) and are always recovered by
//! the active strategy. Only [`ConfigurationError`] and [`RollbackFailure`]
//! ever cross the pipeline boundary, wrapped in [`PipelineError`].

use crate::core::StageOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Error code for a stage whose `execute` reported failure.
pub const STAGE_FAILED: &str = "STAGE_FAILED";
/// Error code for a stage whose precondition check rejected the context.
pub const INPUT_VALIDATION_FAILED: &str = "INPUT_VALIDATION_FAILED";
/// Error code attached once the retry budget for a stage is spent.
pub const RETRIES_EXHAUSTED: &str = "RETRIES_EXHAUSTED";

/// Serializable description of a stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code (e.g. `STAGE_FAILED`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Whether re-running the stage may succeed.
    #[serde(default = "default_retryable")]
    pub retryable: bool,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

fn default_retryable() -> bool {
    true
}

impl ErrorInfo {
    /// Creates a new, retryable error info.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fix_hint: None,
            retryable: true,
            context: HashMap::new(),
        }
    }

    /// Creates a `STAGE_FAILED` error info.
    #[must_use]
    pub fn stage_failed(message: impl Into<String>) -> Self {
        Self::new(STAGE_FAILED, message)
    }

    /// Builds an error info from an `anyhow` error, keeping the cause chain.
    #[must_use]
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::stage_failed(format!("{err:#}"))
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Marks the failure as permanent.
    #[must_use]
    pub fn permanent(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<StageError> for ErrorInfo {
    fn from(err: StageError) -> Self {
        Self::stage_failed(err.message).with_context_entry("stage", err.stage)
    }
}

/// Error raised by stage code, e.g. a failing rollback hook.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: String,
    /// Error message.
    pub message: String,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Wraps an `anyhow` error raised inside a stage.
    #[must_use]
    pub fn from_anyhow(stage: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::new(stage, format!("{err:#}"))
    }
}

/// Invalid pipeline parameters, detected before any stage runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// The pipeline was built without stages.
    #[error("Pipeline '{pipeline}' has no stages")]
    EmptyPipeline {
        /// Pipeline name.
        pipeline: String,
    },

    /// `max_snapshots` must be at least one.
    #[error("max_snapshots must be greater than zero (got {0})")]
    InvalidMaxSnapshots(usize),

    /// `backoff_base` must be a positive, finite number.
    #[error("backoff_base must be a positive finite number (got {0})")]
    InvalidBackoffBase(f64),

    /// The error strategy name is not recognised.
    #[error("Invalid error_strategy '{name}'. Valid options: {}", valid.join(", "))]
    UnknownStrategy {
        /// The rejected name.
        name: String,
        /// Accepted names.
        valid: Vec<String>,
    },

    /// The configuration document could not be parsed.
    #[error("Invalid pipeline configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Rollback was required but could not be carried out.
///
/// The document held by the context can no longer be trusted when this is
/// returned.
#[derive(Debug, Clone, Error)]
#[error("Rollback for stage '{stage}' failed: {reason}")]
pub struct RollbackFailure {
    /// Stage whose failure triggered the rollback.
    pub stage: String,
    /// Why the rollback could not be performed.
    pub reason: String,
    /// Stage outcomes recorded up to and including the failing stage.
    pub outcomes: Vec<StageOutcome>,
}

impl RollbackFailure {
    /// Creates a new rollback failure.
    #[must_use]
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
            outcomes: Vec::new(),
        }
    }

    /// Attaches the outcome history.
    #[must_use]
    pub fn with_outcomes(mut self, outcomes: Vec<StageOutcome>) -> Self {
        self.outcomes = outcomes;
        self
    }
}

/// Terminal errors returned by [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid parameters.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A required rollback could not be performed.
    #[error(transparent)]
    Rollback(#[from] RollbackFailure),
}

impl PipelineError {
    /// Returns true for rollback failures.
    #[must_use]
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, Self::Rollback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_creation() {
        let info = ErrorInfo::stage_failed("schema mismatch")
            .with_fix_hint("check the schema directory")
            .with_context_entry("stage", "validate");

        assert_eq!(info.code, STAGE_FAILED);
        assert_eq!(info.message, "schema mismatch");
        assert!(info.retryable);
        assert_eq!(info.fix_hint, Some("check the schema directory".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"validate".to_string()));
        assert_eq!(info.to_string(), "[STAGE_FAILED] schema mismatch");
    }

    #[test]
    fn test_error_info_from_anyhow_keeps_chain() {
        let err = anyhow::anyhow!("disk full").context("writing report");
        let info = ErrorInfo::from_anyhow(&err);
        assert_eq!(info.message, "writing report: disk full");
    }

    #[test]
    fn test_error_info_deserialize_defaults_retryable() {
        let info: ErrorInfo =
            serde_json::from_str(r#"{"code":"STAGE_FAILED","message":"boom"}"#).unwrap();
        assert!(info.retryable);
        assert!(info.context.is_empty());
    }

    #[test]
    fn test_stage_error_into_error_info() {
        let info: ErrorInfo = StageError::new("emit", "sink closed").into();
        assert_eq!(info.message, "sink closed");
        assert_eq!(info.context.get("stage"), Some(&"emit".to_string()));
    }

    #[test]
    fn test_unknown_strategy_lists_options() {
        let err = ConfigurationError::UnknownStrategy {
            name: "explode".to_string(),
            valid: vec!["fail_fast".to_string(), "retry".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid error_strategy 'explode'. Valid options: fail_fast, retry"
        );
    }

    #[test]
    fn test_pipeline_error_kinds() {
        let err: PipelineError = RollbackFailure::new("b", "snapshot evicted").into();
        assert!(err.is_rollback_failure());
        assert!(err.to_string().contains("snapshot evicted"));

        let err: PipelineError = ConfigurationError::InvalidMaxSnapshots(0).into();
        assert!(!err.is_rollback_failure());
    }
}
