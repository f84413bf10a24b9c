//! # Docflow
//!
//! A declarative document-processing pipeline engine.
//!
//! Docflow runs an ordered list of stages against a single working document
//! and provides:
//!
//! - **Sequential execution**: each stage sees exactly the document left by the one before it
//! - **Error strategies**: fail fast, continue, skip, retry with back-off, or roll back
//! - **Bounded snapshots**: the document is saved before each stage for rollback
//! - **Auditable outcomes**: a per-stage record of every run
//!
//! The engine never inspects the document; any `Clone + Send + Sync` value works.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docflow::prelude::*;
//!
//! # async fn example() -> Result<(), PipelineError> {
//! let pipeline = Pipeline::builder("normalize")
//!     .stage(ValidateStage::new("non-empty", |doc: &String| {
//!         anyhow::ensure!(!doc.is_empty(), "document is empty");
//!         Ok(())
//!     }))
//!     .stage(TransformStage::new("trim", |doc: &String, _params| Ok(doc.trim().to_string())))
//!     .error_strategy(ErrorStrategy::Rollback)
//!     .build()?;
//!
//! let outcome = pipeline.run("  <doc/>  ".to_string()).await?;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::{Document, ExecutionContext, Snapshot, SnapshotStore};
    pub use crate::core::{
        OutcomeSummary, PipelineOutcome, StageKind, StageOutcome, StageOutput, StageStatus,
    };
    pub use crate::errors::{
        ConfigurationError, ErrorInfo, PipelineError, RollbackFailure, StageError,
    };
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        DryRunReport, ErrorRecoveryPolicy, ErrorStrategy, Pipeline, PipelineBuilder,
        PipelineConfig, RecoveryAction, RetryPolicy,
    };
    pub use crate::stages::{
        CustomStage, FnStage, NoOpStage, OutputStage, Stage, TransformStage, ValidateStage,
    };
}
