//! The mutable execution context threaded through every stage of a run.

use super::SnapshotStore;
use crate::core::StageOutcome;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use uuid::Uuid;

/// Marker for values that can serve as the working document.
///
/// The engine never looks inside a document; it only needs to copy it for
/// snapshots and move it between tasks.
pub trait Document: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Document for T {}

/// The single mutable source of truth for one pipeline run.
///
/// Holds the current document, a variable bag shared between stages, the
/// chronological stage history and the snapshot store used for rollback.
/// A context belongs to exactly one run; build a fresh one per input.
#[derive(Debug, Clone)]
pub struct ExecutionContext<D> {
    document: D,
    variables: HashMap<String, serde_json::Value>,
    history: Vec<StageOutcome>,
    snapshots: SnapshotStore<D>,
    execution_id: Uuid,
    started_at: DateTime<Utc>,
}

impl<D> ExecutionContext<D> {
    /// Creates a context around an initial document.
    #[must_use]
    pub fn new(document: D) -> Self {
        Self {
            document,
            variables: HashMap::new(),
            history: Vec::new(),
            snapshots: SnapshotStore::default(),
            execution_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Sets the snapshot bound.
    #[must_use]
    pub fn with_max_snapshots(mut self, max_snapshots: NonZeroUsize) -> Self {
        self.snapshots.set_max_snapshots(max_snapshots);
        self
    }

    /// Seeds a variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Seeds several variables at once.
    #[must_use]
    pub fn with_variables(mut self, variables: HashMap<String, serde_json::Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Returns the current document.
    #[must_use]
    pub fn document(&self) -> &D {
        &self.document
    }

    /// Replaces the document wholesale and returns the previous one.
    ///
    /// There is deliberately no partial-update API: a stage either leaves the
    /// document untouched or swaps it, so a rollback is one assignment.
    pub fn replace_document(&mut self, document: D) -> D {
        std::mem::replace(&mut self.document, document)
    }

    /// Consumes the context, returning the document.
    #[must_use]
    pub fn into_document(self) -> D {
        self.document
    }

    /// Gets a variable.
    #[must_use]
    pub fn get_variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Sets a variable, returning the previous value.
    pub fn set_variable(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.variables.insert(key.into(), value.into())
    }

    /// All variables.
    #[must_use]
    pub fn variables(&self) -> &HashMap<String, serde_json::Value> {
        &self.variables
    }

    /// Appends an outcome to the history.
    pub fn record(&mut self, outcome: StageOutcome) {
        self.history.push(outcome);
    }

    /// Stage outcomes in chronological order.
    #[must_use]
    pub fn history(&self) -> &[StageOutcome] {
        &self.history
    }

    /// The most recent outcome.
    #[must_use]
    pub fn last_outcome(&self) -> Option<&StageOutcome> {
        self.history.last()
    }

    /// Returns true if every recorded stage succeeded.
    #[must_use]
    pub fn all_successful(&self) -> bool {
        self.history.iter().all(|o| o.success)
    }

    /// The snapshot store.
    #[must_use]
    pub fn snapshots(&self) -> &SnapshotStore<D> {
        &self.snapshots
    }

    pub(crate) fn snapshots_mut(&mut self) -> &mut SnapshotStore<D> {
        &mut self.snapshots
    }

    /// Unique id of this run.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// When the context was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    /// JSON summary of the run so far (the document is not included).
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "execution_id": self.execution_id.to_string(),
            "start_time": self.started_at.to_rfc3339(),
            "elapsed_seconds": self.elapsed().as_secs_f64(),
            "variables": self.variables,
            "stage_results": self.history,
            "all_successful": self.all_successful(),
            "snapshots": self.snapshots.len(),
        })
    }
}

impl<D: Clone> ExecutionContext<D> {
    /// Saves a copy of the current document ahead of `stage_name`.
    pub(crate) fn capture_snapshot(&mut self, stage_name: &str) -> u64 {
        let document = self.document.clone();
        self.snapshots.push(stage_name, document)
    }

    /// Restores the document saved ahead of `stage_name`.
    ///
    /// Returns false when no such snapshot is retained.
    pub(crate) fn restore_snapshot(&mut self, stage_name: &str) -> bool {
        match self.snapshots.restore_to(stage_name) {
            Some(document) => {
                self.document = document;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorInfo;

    #[test]
    fn test_context_creation() {
        let ctx = ExecutionContext::new("<doc/>".to_string()).with_variable("env", "prod");

        assert_eq!(ctx.document(), "<doc/>");
        assert_eq!(ctx.get_variable("env"), Some(&serde_json::json!("prod")));
        assert!(ctx.history().is_empty());
        assert!(ctx.all_successful());
        assert_eq!(ctx.execution_id().get_version_num(), 4);
    }

    #[test]
    fn test_replace_document_returns_previous() {
        let mut ctx = ExecutionContext::new(vec![1, 2]);
        let previous = ctx.replace_document(vec![3]);

        assert_eq!(previous, vec![1, 2]);
        assert_eq!(ctx.document(), &vec![3]);
        assert_eq!(ctx.into_document(), vec![3]);
    }

    #[test]
    fn test_set_variable_overwrites() {
        let mut ctx = ExecutionContext::new(());
        assert_eq!(ctx.set_variable("count", 1), None);
        assert_eq!(ctx.set_variable("count", 2), Some(serde_json::json!(1)));
        assert_eq!(ctx.get_variable("count"), Some(&serde_json::json!(2)));
        assert_eq!(ctx.get_variable("missing"), None);
    }

    #[test]
    fn test_record_appends_in_order() {
        let mut ctx = ExecutionContext::new(());
        ctx.record(StageOutcome::succeeded("a"));
        ctx.record(StageOutcome::failed("b", ErrorInfo::stage_failed("boom")));

        let names: Vec<_> = ctx.history().iter().map(|o| o.stage_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(ctx.last_outcome().map(|o| o.success), Some(false));
        assert!(!ctx.all_successful());
    }

    #[test]
    fn test_capture_and_restore_snapshot() {
        let mut ctx = ExecutionContext::new("v1".to_string());
        ctx.capture_snapshot("transform");
        ctx.replace_document("v2".to_string());

        assert!(ctx.restore_snapshot("transform"));
        assert_eq!(ctx.document(), "v1");
        assert!(!ctx.restore_snapshot("unknown"));
    }

    #[test]
    fn test_summary_excludes_document() {
        let mut ctx = ExecutionContext::new("secret".to_string()).with_variable("k", 1);
        ctx.record(StageOutcome::succeeded("a"));

        let summary = ctx.summary();
        assert_eq!(summary["all_successful"], true);
        assert_eq!(summary["variables"]["k"], 1);
        assert_eq!(summary["stage_results"][0]["stage_name"], "a");
        assert!(!summary.to_string().contains("secret"));
    }
}
