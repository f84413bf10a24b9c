//! The sequential pipeline engine.

use super::{
    ErrorRecoveryPolicy, ErrorStrategy, PipelineBuilder, PipelineConfig, RecoveryAction,
};
use crate::context::{Document, ExecutionContext};
use crate::core::{PipelineOutcome, StageKind, StageOutcome, StageOutput};
use crate::errors::{
    ConfigurationError, ErrorInfo, INPUT_VALIDATION_FAILED, PipelineError, RETRIES_EXHAUSTED,
    RollbackFailure,
};
use crate::observability::SpanTimer;
use crate::stages::Stage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

/// An ordered list of stages run against one document.
///
/// A pipeline is immutable once built and can run any number of documents,
/// concurrently if needed; all per-run state lives in the
/// [`ExecutionContext`].
pub struct Pipeline<D: Document> {
    name: String,
    stages: Vec<Arc<dyn Stage<D>>>,
    config: PipelineConfig,
    max_snapshots: NonZeroUsize,
    policy: ErrorRecoveryPolicy,
}

impl<D: Document> Pipeline<D> {
    /// Creates a pipeline from resolved stages.
    ///
    /// # Errors
    ///
    /// Returns an error if `stages` is empty or the configuration is invalid.
    pub fn new(
        name: impl Into<String>,
        stages: Vec<Arc<dyn Stage<D>>>,
        config: PipelineConfig,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if stages.is_empty() {
            return Err(ConfigurationError::EmptyPipeline { pipeline: name });
        }

        let max_snapshots = config.validate()?;
        if config.error_strategy == ErrorStrategy::Rollback && !config.rollback_enabled {
            warn!(
                pipeline = %name,
                "Rollback strategy selected with snapshots disabled; any stage failure will be a rollback failure"
            );
        }

        let policy = config.recovery_policy();
        Ok(Self {
            name,
            stages,
            config,
            max_snapshots,
            policy,
        })
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<D> {
        PipelineBuilder::new(name)
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a built pipeline.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The recovery policy applied to failures.
    #[must_use]
    pub fn policy(&self) -> &ErrorRecoveryPolicy {
        &self.policy
    }

    /// Creates a fresh context bounded by this pipeline's snapshot limit.
    #[must_use]
    pub fn new_context(&self, document: D) -> ExecutionContext<D> {
        ExecutionContext::new(document).with_max_snapshots(self.max_snapshots)
    }

    /// Runs the pipeline on a document with a fresh context.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Rollback`] if a required rollback could not be
    /// performed. Stage failures are reported in the outcome, not as errors.
    pub async fn run(&self, document: D) -> Result<PipelineOutcome<D>, PipelineError> {
        let mut ctx = self.new_context(document);
        self.execute(&mut ctx).await
    }

    /// Runs the pipeline against a caller-supplied context.
    ///
    /// The context's snapshot bound is set to the pipeline's before the first
    /// stage. Outcomes recorded by earlier runs on the same context stay in
    /// its history but are not part of the returned outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Rollback`] if a required rollback could not be
    /// performed.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext<D>,
    ) -> Result<PipelineOutcome<D>, PipelineError> {
        let span = tracing::info_span!(
            "pipeline.run",
            pipeline = %self.name,
            execution_id = %ctx.execution_id(),
            strategy = %self.policy.strategy,
        );
        self.execute_stages(ctx).instrument(span).await
    }

    async fn execute_stages(
        &self,
        ctx: &mut ExecutionContext<D>,
    ) -> Result<PipelineOutcome<D>, PipelineError> {
        let timer = SpanTimer::start(self.name.as_str());
        ctx.snapshots_mut().set_max_snapshots(self.max_snapshots);
        let history_start = ctx.history().len();
        let mut aborted_at = None;
        let mut rolled_back = false;

        info!(stages = self.stages.len(), "Pipeline started");

        for stage in &self.stages {
            let stage = stage.as_ref();

            if self.config.rollback_enabled {
                let sequence = ctx.capture_snapshot(stage.name());
                debug!(stage = stage.name(), sequence, "Captured snapshot");
            }

            // `invoke` consumes `RetryNow` in its retry loop; the action here is settled.
            let (outcome, action) = self.invoke(stage, ctx).await;
            ctx.record(outcome);

            if action.is_terminal() {
                if action == RecoveryAction::RestoreAndAbort {
                    if let Err(failure) = self.roll_back(stage, ctx).await {
                        error!(stage = stage.name(), reason = %failure.reason, "Rollback failed");
                        let outcomes = ctx.history().iter().skip(history_start).cloned().collect();
                        return Err(failure.with_outcomes(outcomes).into());
                    }
                    rolled_back = true;
                }
                aborted_at = Some(stage.name().to_string());
                break;
            }
        }

        let outcomes: Vec<StageOutcome> = ctx.history().iter().skip(history_start).cloned().collect();
        let success = aborted_at.is_none() && outcomes.iter().all(|o| o.success);
        let error = outcomes
            .iter()
            .rev()
            .find_map(|o| o.error_message().map(str::to_string));
        let duration_ms = timer.finish();

        if success {
            info!(duration_ms, stages_executed = outcomes.len(), "Pipeline completed");
        } else {
            warn!(
                duration_ms,
                aborted_at = aborted_at.as_deref().unwrap_or(""),
                stages_failed = outcomes.iter().filter(|o| !o.success).count(),
                rolled_back,
                "Pipeline finished with failures"
            );
        }

        Ok(PipelineOutcome {
            pipeline_name: self.name.clone(),
            execution_id: ctx.execution_id(),
            success,
            outcomes,
            final_document: ctx.document().clone(),
            aborted_at,
            error,
            rolled_back,
            duration_ms,
        })
    }

    /// Runs one stage to its final outcome, retries included.
    ///
    /// The returned action is never [`RecoveryAction::RetryNow`].
    async fn invoke(
        &self,
        stage: &dyn Stage<D>,
        ctx: &mut ExecutionContext<D>,
    ) -> (StageOutcome, RecoveryAction) {
        let name = stage.name();
        let kind = stage.kind();
        let started_at = Utc::now();
        let timer = SpanTimer::start(name);

        if !stage.validate_input(ctx) {
            let error = ErrorInfo::new(
                INPUT_VALIDATION_FAILED,
                format!("Input validation failed for stage '{name}'"),
            )
            .permanent();
            let outcome = StageOutcome::from_output(
                name,
                kind,
                StageOutput::fail_with(error),
                0,
                started_at,
                timer.elapsed(),
            );
            let action = self.policy.decide(&outcome, 0);
            return (self.settle(outcome, action, &[]), action);
        }

        let mut attempt: u32 = 0;
        let mut retry_delays_ms: Vec<u64> = Vec::new();

        loop {
            attempt += 1;
            info!(stage = name, kind = %kind, attempt, "Executing stage");

            let output = stage.execute(ctx).await;
            let outcome =
                StageOutcome::from_output(name, kind, output, attempt, started_at, timer.elapsed());
            let action = self.policy.decide(&outcome, attempt - 1);

            let RecoveryAction::RetryNow(delay) = action else {
                return (self.settle(outcome, action, &retry_delays_ms), action);
            };

            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(
                stage = name,
                attempt,
                max_attempts = self.policy.retry.max_attempts(),
                delay_ms,
                error = outcome.error_message().unwrap_or_default(),
                "Stage failed, retrying"
            );
            retry_delays_ms.push(delay_ms);
            tokio::time::sleep(delay).await;
        }
    }

    /// Finalizes an outcome: logs the decision and attaches recovery metadata.
    fn settle(
        &self,
        mut outcome: StageOutcome,
        action: RecoveryAction,
        retry_delays_ms: &[u64],
    ) -> StageOutcome {
        if !retry_delays_ms.is_empty() {
            outcome
                .metadata
                .insert("retry_delays_ms".to_string(), serde_json::json!(retry_delays_ms));
        }

        if outcome.success {
            if retry_delays_ms.is_empty() {
                debug!(stage = %outcome.stage_name, duration_ms = outcome.duration_ms, "Stage completed");
            } else {
                info!(
                    stage = %outcome.stage_name,
                    attempts = outcome.attempt_count,
                    "Stage succeeded after retry"
                );
            }
            return outcome;
        }

        let attempts = outcome.attempt_count;
        if self.policy.strategy == ErrorStrategy::Retry && attempts > 1 && outcome.is_retryable() {
            if let Some(error) = outcome.error.as_mut() {
                error.message = format!("Failed after {attempts} attempts: {}", error.message);
                error.code = RETRIES_EXHAUSTED.to_string();
            }
        }

        outcome
            .metadata
            .insert("recovery".to_string(), serde_json::json!(action.label()));

        let stage = outcome.stage_name.as_str();
        let message = outcome.error_message().unwrap_or_default();
        match action {
            RecoveryAction::ContinueNext => {
                warn!(stage, error = message, "Stage failed, continuing with next stage");
            }
            RecoveryAction::SkipNext => {
                warn!(stage, error = message, "Stage failed, skipping to next stage");
            }
            RecoveryAction::RestoreAndAbort => {
                warn!(stage, error = message, "Stage failed, rolling back");
            }
            RecoveryAction::Abort => {
                error!(stage, attempts, error = message, "Stage failed, aborting pipeline");
            }
            // Only settled actions are passed in.
            RecoveryAction::RetryNow(_) => {}
        }

        outcome
    }

    /// Restores the snapshot taken before `stage` and runs its rollback hook.
    ///
    /// The failing stage's snapshot is always the newest one and the bound is
    /// at least one, so a lookup miss is not expected from `execute_stages`;
    /// it is still reported as a [`RollbackFailure`] rather than ignored.
    async fn roll_back(
        &self,
        stage: &dyn Stage<D>,
        ctx: &mut ExecutionContext<D>,
    ) -> Result<(), RollbackFailure> {
        let name = stage.name();

        if !self.config.rollback_enabled {
            return Err(RollbackFailure::new(
                name,
                "rollback is disabled, no snapshot was taken",
            ));
        }

        if !ctx.restore_snapshot(name) {
            return Err(RollbackFailure::new(
                name,
                format!("snapshot for stage '{name}' was evicted"),
            ));
        }

        stage
            .rollback(ctx)
            .await
            .map_err(|err| RollbackFailure::new(name, format!("rollback hook failed: {}", err.message)))?;

        info!(stage = name, "Rolled back to snapshot");
        Ok(())
    }

    /// Checks every stage's precondition without executing anything.
    ///
    /// The context is only read; no snapshot is taken and no outcome recorded.
    #[must_use]
    pub fn dry_run(&self, ctx: &ExecutionContext<D>) -> DryRunReport {
        let entries: Vec<DryRunEntry> = self
            .stages
            .iter()
            .enumerate()
            .map(|(position, stage)| DryRunEntry {
                position,
                name: stage.name().to_string(),
                kind: stage.kind(),
                valid: stage.validate_input(ctx),
            })
            .collect();

        for entry in &entries {
            info!(
                pipeline = %self.name,
                position = entry.position,
                stage = %entry.name,
                kind = %entry.kind,
                valid = entry.valid,
                "Dry run"
            );
        }

        DryRunReport {
            pipeline_name: self.name.clone(),
            strategy: self.policy.strategy,
            entries,
        }
    }

    /// JSON description of the pipeline's shape and configuration.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        let stages: Vec<serde_json::Value> = self
            .stages
            .iter()
            .map(|s| serde_json::json!({ "name": s.name(), "kind": s.kind() }))
            .collect();

        serde_json::json!({
            "name": self.name,
            "stages": stages,
            "error_strategy": self.config.error_strategy,
            "rollback_enabled": self.config.rollback_enabled,
            "max_snapshots": self.max_snapshots.get(),
            "retry": self.config.retry,
        })
    }
}

impl<D: Document> fmt::Debug for Pipeline<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .field("config", &self.config)
            .finish()
    }
}

/// One stage as seen by [`Pipeline::dry_run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunEntry {
    /// Zero-based position in the pipeline.
    pub position: usize,
    /// Stage name.
    pub name: String,
    /// Stage kind.
    pub kind: StageKind,
    /// Result of the precondition check.
    pub valid: bool,
}

/// The report returned by [`Pipeline::dry_run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunReport {
    /// Pipeline name.
    pub pipeline_name: String,
    /// Strategy that a real run would use.
    pub strategy: ErrorStrategy,
    /// Stages in execution order.
    pub entries: Vec<DryRunEntry>,
}

impl DryRunReport {
    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Returns true if every precondition passed.
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.entries.iter().all(|e| e.valid)
    }

    /// Names of stages whose precondition failed.
    #[must_use]
    pub fn invalid_stages(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| !e.valid)
            .map(|e| e.name.as_str())
            .collect()
    }
}
