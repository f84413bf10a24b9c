//! Per-stage and per-run outcome records.

use super::{StageKind, StageOutput};
use crate::errors::ErrorInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const MISSING_ERROR_MESSAGE: &str = "stage reported failure without details";

/// The recorded result of running one stage, retries included.
///
/// Immutable once appended to the context history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name.
    pub stage_name: String,
    /// Stage kind.
    #[serde(default)]
    pub kind: StageKind,
    /// Whether the stage eventually succeeded.
    pub success: bool,
    /// Error details of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// How many times `execute` was invoked (0 if the precondition failed).
    pub attempt_count: u32,
    /// Metadata reported by the stage and the engine.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
    /// Wall time across all attempts, back-off waits included.
    pub duration_ms: f64,
}

impl StageOutcome {
    /// Builds an outcome from the output of the last attempt.
    ///
    /// A failed output without error details gets a retryable
    /// `STAGE_FAILED` error so every failed outcome carries a message.
    #[must_use]
    pub fn from_output(
        stage_name: impl Into<String>,
        kind: StageKind,
        output: StageOutput,
        attempt_count: u32,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let success = output.is_success();
        let error = match output.error {
            None if !success => Some(ErrorInfo::stage_failed(MISSING_ERROR_MESSAGE)),
            error => error,
        };

        Self {
            stage_name: stage_name.into(),
            kind,
            success,
            error,
            attempt_count,
            metadata: output.metadata,
            started_at,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Creates a successful single-attempt outcome.
    #[must_use]
    pub fn succeeded(stage_name: impl Into<String>) -> Self {
        Self::from_output(
            stage_name,
            StageKind::Custom,
            StageOutput::ok(),
            1,
            Utc::now(),
            Duration::ZERO,
        )
    }

    /// Creates a failed single-attempt outcome.
    #[must_use]
    pub fn failed(stage_name: impl Into<String>, error: ErrorInfo) -> Self {
        Self::from_output(
            stage_name,
            StageKind::Custom,
            StageOutput::fail_with(error),
            1,
            Utc::now(),
            Duration::ZERO,
        )
    }

    /// Sets a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Returns true if a failure may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }
}

/// The final report of one `Pipeline` run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome<D> {
    /// Pipeline name.
    pub pipeline_name: String,
    /// Execution id of the context that was run.
    pub execution_id: Uuid,
    /// Authoritative overall success flag.
    pub success: bool,
    /// Per-stage audit trail in execution order.
    pub outcomes: Vec<StageOutcome>,
    /// Document state when the run ended.
    pub final_document: D,
    /// Stage that terminated the run early.
    pub aborted_at: Option<String>,
    /// Message of the last stage failure.
    pub error: Option<String>,
    /// Whether a snapshot was restored before aborting.
    pub rolled_back: bool,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

impl<D> PipelineOutcome<D> {
    /// Number of stages that produced an outcome.
    #[must_use]
    pub fn stages_executed(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of stages that failed.
    #[must_use]
    pub fn stages_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// The last recorded outcome.
    #[must_use]
    pub fn last_outcome(&self) -> Option<&StageOutcome> {
        self.outcomes.last()
    }

    /// Finds the most recent outcome for a stage.
    #[must_use]
    pub fn outcome(&self, stage_name: &str) -> Option<&StageOutcome> {
        self.outcomes.iter().rev().find(|o| o.stage_name == stage_name)
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.stage_name.as_str()).collect()
    }

    /// Returns true if the run stopped before the last stage.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted_at.is_some()
    }

    /// A serialisable report without the document.
    #[must_use]
    pub fn summary(&self) -> OutcomeSummary {
        OutcomeSummary {
            pipeline_name: self.pipeline_name.clone(),
            execution_id: self.execution_id,
            success: self.success,
            aborted_at: self.aborted_at.clone(),
            error: self.error.clone(),
            rolled_back: self.rolled_back,
            stages_executed: self.stages_executed(),
            stages_failed: self.stages_failed(),
            duration_ms: self.duration_ms,
            outcomes: self.outcomes.clone(),
        }
    }
}

/// Document-free report of a run, suitable for JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// Pipeline name.
    pub pipeline_name: String,
    /// Execution id.
    pub execution_id: Uuid,
    /// Overall success.
    pub success: bool,
    /// Stage that terminated the run early.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted_at: Option<String>,
    /// Last failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a snapshot was restored.
    pub rolled_back: bool,
    /// Stages with an outcome.
    pub stages_executed: usize,
    /// Stages that failed.
    pub stages_failed: usize,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
    /// Per-stage outcomes.
    pub outcomes: Vec<StageOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::errors::STAGE_FAILED;

    fn sample_outcome() -> PipelineOutcome<String> {
        PipelineOutcome {
            pipeline_name: "report".to_string(),
            execution_id: Uuid::new_v4(),
            success: false,
            outcomes: vec![
                StageOutcome::succeeded("a"),
                StageOutcome::failed("b", ErrorInfo::stage_failed("boom")),
            ],
            final_document: "<doc/>".to_string(),
            aborted_at: Some("b".to_string()),
            error: Some("boom".to_string()),
            rolled_back: false,
            duration_ms: 3.0,
        }
    }

    #[test]
    fn test_stage_outcome_from_output() {
        let output = StageOutput::fail("timeout").add_metadata("host", serde_json::json!("db"));
        let outcome = StageOutcome::from_output(
            "fetch",
            StageKind::Custom,
            output,
            3,
            Utc::now(),
            Duration::from_millis(1500),
        );

        assert!(!outcome.success);
        assert_eq!(outcome.attempt_count, 3);
        assert_eq!(outcome.error_message(), Some("timeout"));
        assert!((outcome.duration_ms - 1500.0).abs() < f64::EPSILON);
        assert_eq!(outcome.metadata.get("host"), Some(&serde_json::json!("db")));
    }

    #[test]
    fn test_failure_without_error_gets_default_error() {
        let output = StageOutput {
            status: StageStatus::Fail,
            error: None,
            metadata: HashMap::new(),
        };
        let outcome = StageOutcome::from_output(
            "bare",
            StageKind::Custom,
            output,
            1,
            Utc::now(),
            Duration::ZERO,
        );

        assert!(!outcome.success);
        assert!(outcome.is_retryable());
        assert_eq!(outcome.error_message(), Some(MISSING_ERROR_MESSAGE));
        assert_eq!(outcome.error.as_ref().map(|e| e.code.as_str()), Some(STAGE_FAILED));
    }

    #[test]
    fn test_pipeline_outcome_counters() {
        let outcome = sample_outcome();
        assert_eq!(outcome.stages_executed(), 2);
        assert_eq!(outcome.stages_failed(), 1);
        assert_eq!(outcome.stage_names(), vec!["a", "b"]);
        assert_eq!(outcome.last_outcome().map(|o| o.stage_name.as_str()), Some("b"));
        assert!(outcome.outcome("a").is_some_and(|o| o.success));
        assert!(outcome.is_aborted());
    }

    #[test]
    fn test_summary_serializes_without_document() {
        let summary = sample_outcome().summary();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["pipeline_name"], "report");
        assert_eq!(json["aborted_at"], "b");
        assert_eq!(json["stages_failed"], 1);
        assert!(json.get("final_document").is_none());
    }
}
