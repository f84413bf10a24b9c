//! Pipeline configuration.

use super::{ErrorRecoveryPolicy, ErrorStrategy, RetryPolicy};
use crate::context::DEFAULT_MAX_SNAPSHOTS;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// Engine parameters shared by every run of a pipeline.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use docflow::pipeline::{ErrorStrategy, PipelineConfig};
///
/// let config = PipelineConfig::from_json(r#"{"error_strategy": "rollback"}"#).unwrap();
/// assert_eq!(config.error_strategy, ErrorStrategy::Rollback);
/// assert_eq!(config.max_snapshots, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Strategy applied to stage failures.
    pub error_strategy: ErrorStrategy,
    /// Whether snapshots are taken before each stage.
    pub rollback_enabled: bool,
    /// Snapshot retention bound.
    pub max_snapshots: usize,
    /// Retry parameters.
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            error_strategy: ErrorStrategy::default(),
            rollback_enabled: true,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS.get(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the error strategy.
    #[must_use]
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    /// Enables or disables snapshots.
    #[must_use]
    pub fn with_rollback_enabled(mut self, enabled: bool) -> Self {
        self.rollback_enabled = enabled;
        self
    }

    /// Sets the snapshot bound.
    #[must_use]
    pub fn with_max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.max_snapshots = max_snapshots;
        self
    }

    /// Sets the retry parameters.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Checks the parameters and returns the snapshot bound.
    pub fn validate(&self) -> Result<NonZeroUsize, ConfigurationError> {
        self.retry.validate()?;
        NonZeroUsize::new(self.max_snapshots)
            .ok_or(ConfigurationError::InvalidMaxSnapshots(self.max_snapshots))
    }

    /// The recovery policy derived from this configuration.
    #[must_use]
    pub fn recovery_policy(&self) -> ErrorRecoveryPolicy {
        ErrorRecoveryPolicy::new(self.error_strategy, self.retry.clone())
    }
}
