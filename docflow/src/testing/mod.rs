//! Testing utilities for docflow pipelines.
//!
//! This module provides:
//! - Mock stages sharing a call log
//! - Test assertions for pipeline outcomes

mod assertions;
mod mocks;

pub use assertions::{
    assert_aborted_at, assert_pipeline_failed, assert_pipeline_succeeded,
    assert_stage_attempts, assert_stage_failed, assert_stage_order,
};
pub use mocks::{CallLog, FailingStage, FlakyStage, RecordedCall, RecordingStage, ReplaceStage};
