//! Stage trait and implementations.
//!
//! Stages are the only extension point of the engine: every step of a
//! pipeline is a named value implementing [`Stage`].

mod kinds;

pub use kinds::{CustomStage, OutputStage, Precondition, TransformStage, ValidateStage};

use crate::context::{Document, ExecutionContext};
use crate::core::{StageKind, StageOutput};
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// A stage may read and replace the context's document and variables during
/// `execute`, and must not keep the context afterwards. Under the Retry
/// strategy `execute` can be called several times for the same stage.
#[async_trait]
pub trait Stage<D: Document>: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the kind of work this stage performs.
    fn kind(&self) -> StageKind {
        StageKind::Custom
    }

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The execution context of the current run
    ///
    /// # Returns
    ///
    /// The stage output indicating success or failure.
    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput;

    /// Undoes side effects of `execute` after the engine restored the
    /// snapshot taken before this stage.
    async fn rollback(&self, _ctx: &mut ExecutionContext<D>) -> Result<(), StageError> {
        Ok(())
    }

    /// Cheap, side-effect-free precondition check.
    fn validate_input(&self, _ctx: &ExecutionContext<D>) -> bool {
        true
    }
}

/// A simple function-based stage.
pub struct FnStage<F> {
    name: String,
    func: F,
}

impl<F> FnStage<F> {
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<D, F> Stage<D> for FnStage<F>
where
    D: Document,
    F: Fn(&mut ExecutionContext<D>) -> StageOutput + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput {
        (self.func)(ctx)
    }
}

/// A stage that always succeeds without touching the context.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<D: Document> Stage<D> for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<D>) -> StageOutput {
        StageOutput::ok()
    }
}
