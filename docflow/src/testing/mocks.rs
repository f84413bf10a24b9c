//! Mock stages for testing.
//!
//! Every mock appends its name and the tokio time of each `execute` call to a
//! [`CallLog`]. Several mocks can share one log to check execution order and
//! back-off timing across a whole run.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;

use crate::context::{Document, ExecutionContext};
use crate::core::StageOutput;
use crate::errors::StageError;
use crate::stages::Stage;

/// A single recorded `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Stage that was called.
    pub stage: String,
    /// Tokio time of the call.
    pub at: Instant,
}

/// Shared, append-only record of stage calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a call.
    pub fn record(&self, stage: &str) {
        self.calls.lock().push(RecordedCall {
            stage: stage.to_string(),
            at: Instant::now(),
        });
    }

    /// All recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Total number of calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing was called.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Number of calls made to one stage.
    #[must_use]
    pub fn count(&self, stage: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.stage == stage).count()
    }

    /// Called stage names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.stage.clone()).collect()
    }

    /// Call times for one stage.
    #[must_use]
    pub fn instants(&self, stage: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.stage == stage)
            .map(|c| c.at)
            .collect()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// A stage that records calls and succeeds without touching the document.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    log: CallLog,
}

impl RecordingStage {
    /// Creates a new recording stage with its own log.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: CallLog::new(),
        }
    }

    /// Records into a shared log.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// The log this stage records into.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl<D: Document> Stage<D> for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<D>) -> StageOutput {
        self.log.record(&self.name);
        StageOutput::ok()
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: String,
    retryable: bool,
    rollback_error: Option<String>,
    log: CallLog,
}

impl FailingStage {
    /// Creates a stage that fails with a retryable error.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            retryable: true,
            rollback_error: None,
            log: CallLog::new(),
        }
    }

    /// Creates a stage that fails with a permanent error.
    #[must_use]
    pub fn permanent(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(name, error)
        }
    }

    /// Makes the rollback hook fail too.
    #[must_use]
    pub fn with_failing_rollback(mut self, error: impl Into<String>) -> Self {
        self.rollback_error = Some(error.into());
        self
    }

    /// Records into a shared log.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// The log this stage records into.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl<D: Document> Stage<D> for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<D>) -> StageOutput {
        self.log.record(&self.name);
        if self.retryable {
            StageOutput::fail(&self.error)
        } else {
            StageOutput::fail_permanent(&self.error)
        }
    }

    async fn rollback(&self, _ctx: &mut ExecutionContext<D>) -> Result<(), StageError> {
        match &self.rollback_error {
            Some(error) => Err(StageError::new(&self.name, error)),
            None => Ok(()),
        }
    }
}

/// A stage that fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStage {
    name: String,
    failures: u32,
    calls: AtomicU32,
    log: CallLog,
}

impl FlakyStage {
    /// Creates a stage whose first `failures` calls fail.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            calls: AtomicU32::new(0),
            log: CallLog::new(),
        }
    }

    /// Records into a shared log.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// The log this stage records into.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

#[async_trait]
impl<D: Document> Stage<D> for FlakyStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<D>) -> StageOutput {
        self.log.record(&self.name);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            StageOutput::fail(format!("transient failure {call} of {}", self.failures))
        } else {
            StageOutput::ok()
        }
    }
}

/// A stage that replaces the document with a computed value.
pub struct ReplaceStage<D> {
    name: String,
    replace: Box<dyn Fn(&D) -> D + Send + Sync>,
    log: CallLog,
}

impl<D> ReplaceStage<D> {
    /// Creates a stage computing the next document from the current one.
    #[must_use]
    pub fn new(name: impl Into<String>, replace: impl Fn(&D) -> D + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            replace: Box::new(replace),
            log: CallLog::new(),
        }
    }

    /// Records into a shared log.
    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// The log this stage records into.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }
}

impl<D: Clone + Send + Sync + 'static> ReplaceStage<D> {
    /// Creates a stage that sets the document to a fixed value.
    #[must_use]
    pub fn constant(name: impl Into<String>, document: D) -> Self {
        Self::new(name, move |_| document.clone())
    }
}

impl<D> std::fmt::Debug for ReplaceStage<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaceStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<D: Document> Stage<D> for ReplaceStage<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput {
        self.log.record(&self.name);
        let next = (self.replace)(ctx.document());
        ctx.replace_document(next);
        StageOutput::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_stage_shares_log() {
        let log = CallLog::new();
        let a = RecordingStage::new("a").with_log(log.clone());
        let b = RecordingStage::new("b").with_log(log.clone());
        let mut ctx = ExecutionContext::new(());

        Stage::<()>::execute(&a, &mut ctx).await;
        Stage::<()>::execute(&b, &mut ctx).await;
        Stage::<()>::execute(&a, &mut ctx).await;

        assert_eq!(log.names(), vec!["a", "b", "a"]);
        assert_eq!(log.count("a"), 2);
        assert_eq!(a.log().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_stage_retryability() {
        let mut ctx = ExecutionContext::new(());

        let transient = FailingStage::new("t", "try again");
        assert!(Stage::<()>::execute(&transient, &mut ctx).await.is_retryable());

        let permanent = FailingStage::permanent("p", "bad input");
        let output = Stage::<()>::execute(&permanent, &mut ctx).await;
        assert!(output.is_failure());
        assert!(!output.is_retryable());
    }

    #[tokio::test]
    async fn test_failing_rollback_hook() {
        let stage = FailingStage::new("f", "boom").with_failing_rollback("cannot undo");
        let mut ctx = ExecutionContext::new(());

        let err = Stage::<()>::rollback(&stage, &mut ctx).await.unwrap_err();
        assert_eq!(err.message, "cannot undo");
    }

    #[tokio::test]
    async fn test_flaky_stage_recovers() {
        let stage = FlakyStage::new("flaky", 2);
        let mut ctx = ExecutionContext::new(());

        assert!(Stage::<()>::execute(&stage, &mut ctx).await.is_failure());
        assert!(Stage::<()>::execute(&stage, &mut ctx).await.is_failure());
        assert!(Stage::<()>::execute(&stage, &mut ctx).await.is_success());
        assert_eq!(stage.log().count("flaky"), 3);
    }

    #[tokio::test]
    async fn test_replace_stage() {
        let stage = ReplaceStage::new("double", |n: &i32| n * 2);
        let mut ctx = ExecutionContext::new(21);

        stage.execute(&mut ctx).await;
        assert_eq!(*ctx.document(), 42);

        let constant = ReplaceStage::constant("reset", 0);
        constant.execute(&mut ctx).await;
        assert_eq!(*ctx.document(), 0);
    }
}
