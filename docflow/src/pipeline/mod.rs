//! Pipeline building and execution.
//!
//! This module provides:
//! - Error strategies and the retry policy
//! - The recovery decision applied to each failed stage
//! - Pipeline configuration and builder with validation
//! - The sequential execution engine

mod builder;
mod config;
mod engine;
mod recovery;
mod retry;
mod strategy;


pub use builder::{DEFAULT_PIPELINE_NAME, PipelineBuilder};
pub use config::PipelineConfig;
pub use engine::{DryRunEntry, DryRunReport, Pipeline};
pub use recovery::{ErrorRecoveryPolicy, RecoveryAction};
pub use retry::RetryPolicy;
pub use strategy::ErrorStrategy;
