//! Core domain model types for docflow.
//!
//! This module contains the value types exchanged between stages and the
//! engine:
//! - Stage status and kind enums
//! - The stage output returned from `execute`
//! - Per-stage and per-run outcomes

mod outcome;
mod output;
mod status;

pub use outcome::{OutcomeSummary, PipelineOutcome, StageOutcome};
pub use output::StageOutput;
pub use status::{StageKind, StageStatus};
