//! Pipeline builder.

use super::{ErrorStrategy, Pipeline, PipelineConfig, RetryPolicy};
use crate::context::Document;
use crate::errors::ConfigurationError;
use crate::stages::Stage;
use std::fmt;
use std::sync::Arc;

/// Default pipeline name.
pub const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added.
pub struct PipelineBuilder<D: Document> {
    name: String,
    stages: Vec<Arc<dyn Stage<D>>>,
    config: PipelineConfig,
}

impl<D: Document> PipelineBuilder<D> {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            config: PipelineConfig::default(),
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(self, stage: impl Stage<D> + 'static) -> Self {
        self.stage_arc(Arc::new(stage))
    }

    /// Appends a shared stage.
    #[must_use]
    pub fn stage_arc(mut self, stage: Arc<dyn Stage<D>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the error strategy.
    #[must_use]
    pub fn error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.config.error_strategy = strategy;
        self
    }

    /// Enables or disables snapshots.
    #[must_use]
    pub fn rollback_enabled(mut self, enabled: bool) -> Self {
        self.config.rollback_enabled = enabled;
        self
    }

    /// Sets the snapshot bound. Zero is rejected by [`build`](Self::build).
    #[must_use]
    pub fn max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.config.max_snapshots = max_snapshots;
        self
    }

    /// Sets the retry parameters.
    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages added so far.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no stage was added or the configuration is invalid.
    pub fn build(self) -> Result<Pipeline<D>, ConfigurationError> {
        if self.stages.is_empty() {
            return Err(ConfigurationError::EmptyPipeline { pipeline: self.name });
        }
        Pipeline::new(self.name, self.stages, self.config)
    }
}

impl<D: Document> Default for PipelineBuilder<D> {
    fn default() -> Self {
        Self::new(DEFAULT_PIPELINE_NAME)
    }
}

impl<D: Document> fmt::Debug for PipelineBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    #[test]
    fn test_builder_collects_stages_in_order() {
        let pipeline = PipelineBuilder::<String>::new("etl")
            .stage(NoOpStage::new("a"))
            .stage(NoOpStage::new("b"))
            .error_strategy(ErrorStrategy::Skip)
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "etl");
        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
        assert_eq!(pipeline.config().error_strategy, ErrorStrategy::Skip);
    }

    #[test]
    fn test_empty_builder_is_rejected() {
        let err = PipelineBuilder::<String>::new("empty").build().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::EmptyPipeline {
                pipeline: "empty".to_string()
            }
        );
    }

    #[test]
    fn test_zero_snapshots_rejected_at_build() {
        let err = PipelineBuilder::<String>::default()
            .stage(NoOpStage::new("a"))
            .max_snapshots(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidMaxSnapshots(0));
    }

    #[test]
    fn test_default_name_and_debug() {
        let builder = PipelineBuilder::<()>::default().stage(NoOpStage::new("only"));
        assert_eq!(builder.name(), DEFAULT_PIPELINE_NAME);
        assert_eq!(builder.stage_count(), 1);
        assert!(format!("{builder:?}").contains("only"));
    }
}
