//! Context management for pipeline execution.
//!
//! This module provides:
//! - The mutable execution context owned by a single run
//! - The bounded snapshot store used for rollback

mod execution;
mod snapshot;

pub use execution::{Document, ExecutionContext};
pub use snapshot::{Snapshot, SnapshotStore, DEFAULT_MAX_SNAPSHOTS};
