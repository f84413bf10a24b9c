//! Closure-backed stage kinds: validate, transform, output and custom.
//!
//! None of these know anything about the document format; the caller
//! supplies the actual check, transformation or sink.

use super::Stage;
use crate::context::{Document, ExecutionContext};
use crate::core::{StageKind, StageOutput};
use crate::errors::{ErrorInfo, StageError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{self, Debug};

/// A precondition over the current document, used by dry runs and before
/// the first attempt of a real run.
pub type Precondition<D> = Box<dyn Fn(&D) -> bool + Send + Sync>;

type ContextFn<D> = Box<dyn Fn(&mut ExecutionContext<D>) -> StageOutput + Send + Sync>;
type RollbackFn<D> = Box<dyn Fn(&mut ExecutionContext<D>) -> anyhow::Result<()> + Send + Sync>;
type ContextCheck<D> = Box<dyn Fn(&ExecutionContext<D>) -> bool + Send + Sync>;

fn check_precondition<D>(precondition: Option<&Precondition<D>>, document: &D) -> bool {
    precondition.map_or(true, |p| p(document))
}

/// Checks the document and reports, never modifying it.
pub struct ValidateStage<D, F> {
    name: String,
    check: F,
    precondition: Option<Precondition<D>>,
}

impl<D, F> ValidateStage<D, F>
where
    F: Fn(&D) -> anyhow::Result<()> + Send + Sync,
{
    /// Creates a validation stage from a check.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
            precondition: None,
        }
    }

    /// Adds a precondition on the input document.
    #[must_use]
    pub fn with_precondition(mut self, precondition: impl Fn(&D) -> bool + Send + Sync + 'static) -> Self {
        self.precondition = Some(Box::new(precondition));
        self
    }
}

impl<D, F> Debug for ValidateStage<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidateStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<D, F> Stage<D> for ValidateStage<D, F>
where
    D: Document,
    F: Fn(&D) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Validate
    }

    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput {
        match (self.check)(ctx.document()) {
            Ok(()) => StageOutput::ok().add_metadata("valid", serde_json::json!(true)),
            Err(err) => {
                tracing::debug!(stage = %self.name, error = %err, "Validation rejected document");
                StageOutput::fail_with(ErrorInfo::from_anyhow(&err))
                    .add_metadata("valid", serde_json::json!(false))
            }
        }
    }

    fn validate_input(&self, ctx: &ExecutionContext<D>) -> bool {
        check_precondition(self.precondition.as_ref(), ctx.document())
    }
}

/// Replaces the document with the result of a transformation.
pub struct TransformStage<D, F> {
    name: String,
    transform: F,
    params: HashMap<String, serde_json::Value>,
    precondition: Option<Precondition<D>>,
}

impl<D, F> TransformStage<D, F>
where
    F: Fn(&D, &HashMap<String, serde_json::Value>) -> anyhow::Result<D> + Send + Sync,
{
    /// Creates a transformation stage.
    pub fn new(name: impl Into<String>, transform: F) -> Self {
        Self {
            name: name.into(),
            transform,
            params: HashMap::new(),
            precondition: None,
        }
    }

    /// Adds a parameter passed to the transformation.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Adds a precondition on the input document.
    #[must_use]
    pub fn with_precondition(mut self, precondition: impl Fn(&D) -> bool + Send + Sync + 'static) -> Self {
        self.precondition = Some(Box::new(precondition));
        self
    }

    /// The transformation parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, serde_json::Value> {
        &self.params
    }
}

impl<D, F> Debug for TransformStage<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformStage")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

#[async_trait]
impl<D, F> Stage<D> for TransformStage<D, F>
where
    D: Document,
    F: Fn(&D, &HashMap<String, serde_json::Value>) -> anyhow::Result<D> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput {
        match (self.transform)(ctx.document(), &self.params) {
            Ok(document) => {
                ctx.replace_document(document);
                StageOutput::ok()
                    .add_metadata("transform_type", serde_json::json!("function"))
                    .add_metadata("param_count", serde_json::json!(self.params.len()))
            }
            Err(err) => StageOutput::fail_with(ErrorInfo::from_anyhow(&err)),
        }
    }

    fn validate_input(&self, ctx: &ExecutionContext<D>) -> bool {
        check_precondition(self.precondition.as_ref(), ctx.document())
    }
}

/// Hands the document to a sink (report renderer, file writer, ...).
pub struct OutputStage<D, F> {
    name: String,
    format: String,
    sink: F,
    precondition: Option<Precondition<D>>,
}

impl<D, F> OutputStage<D, F>
where
    F: Fn(&D) -> anyhow::Result<()> + Send + Sync,
{
    /// Creates an output stage for the given format label.
    pub fn new(name: impl Into<String>, format: impl Into<String>, sink: F) -> Self {
        Self {
            name: name.into(),
            format: format.into(),
            sink,
            precondition: None,
        }
    }

    /// Adds a precondition on the input document.
    #[must_use]
    pub fn with_precondition(mut self, precondition: impl Fn(&D) -> bool + Send + Sync + 'static) -> Self {
        self.precondition = Some(Box::new(precondition));
        self
    }

    /// The output format label.
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }
}

impl<D, F> Debug for OutputStage<D, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStage")
            .field("name", &self.name)
            .field("format", &self.format)
            .finish()
    }
}

#[async_trait]
impl<D, F> Stage<D> for OutputStage<D, F>
where
    D: Document,
    F: Fn(&D) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Output
    }

    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput {
        let output: StageOutput = (self.sink)(ctx.document()).into();
        output.add_metadata("format", serde_json::json!(self.format))
    }

    fn validate_input(&self, ctx: &ExecutionContext<D>) -> bool {
        check_precondition(self.precondition.as_ref(), ctx.document())
    }
}

/// User-defined logic with optional rollback and precondition hooks.
pub struct CustomStage<D> {
    name: String,
    function: ContextFn<D>,
    rollback_function: Option<RollbackFn<D>>,
    precondition: Option<ContextCheck<D>>,
}

impl<D> CustomStage<D> {
    /// Creates a custom stage.
    pub fn new(
        name: impl Into<String>,
        function: impl Fn(&mut ExecutionContext<D>) -> StageOutput + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            function: Box::new(function),
            rollback_function: None,
            precondition: None,
        }
    }

    /// Sets the function called when this stage is rolled back.
    #[must_use]
    pub fn with_rollback(
        mut self,
        rollback: impl Fn(&mut ExecutionContext<D>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.rollback_function = Some(Box::new(rollback));
        self
    }

    /// Sets a precondition over the whole context.
    #[must_use]
    pub fn with_precondition(
        mut self,
        precondition: impl Fn(&ExecutionContext<D>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.precondition = Some(Box::new(precondition));
        self
    }
}

impl<D> Debug for CustomStage<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStage")
            .field("name", &self.name)
            .field("has_rollback", &self.rollback_function.is_some())
            .finish()
    }
}

#[async_trait]
impl<D: Document> Stage<D> for CustomStage<D> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut ExecutionContext<D>) -> StageOutput {
        (self.function)(ctx)
    }

    async fn rollback(&self, ctx: &mut ExecutionContext<D>) -> Result<(), StageError> {
        match &self.rollback_function {
            Some(rollback) => rollback(ctx).map_err(|err| StageError::from_anyhow(&self.name, &err)),
            None => Ok(()),
        }
    }

    fn validate_input(&self, ctx: &ExecutionContext<D>) -> bool {
        self.precondition.as_ref().map_or(true, |p| p(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[tokio::test]
    async fn test_validate_stage_leaves_document() {
        let stage = ValidateStage::new("non_empty", |doc: &String| {
            if doc.is_empty() {
                bail!("document is empty");
            }
            Ok(())
        });
        assert_eq!(stage.kind(), StageKind::Validate);

        let mut ctx = ExecutionContext::new("<a/>".to_string());
        let output = stage.execute(&mut ctx).await;
        assert!(output.is_success());
        assert_eq!(ctx.document(), "<a/>");

        let mut empty = ExecutionContext::new(String::new());
        let output = stage.execute(&mut empty).await;
        assert!(output.is_failure());
        assert_eq!(output.error.unwrap().message, "document is empty");
        assert_eq!(output.metadata.get("valid"), Some(&serde_json::json!(false)));
    }

    #[tokio::test]
    async fn test_transform_stage_replaces_document() {
        let stage = TransformStage::new("wrap", |doc: &String, params: &HashMap<String, serde_json::Value>| {
            let tag = params.get("tag").and_then(|v| v.as_str()).unwrap_or("root");
            Ok(format!("<{tag}>{doc}</{tag}>"))
        })
        .with_param("tag", "report");

        let mut ctx = ExecutionContext::new("body".to_string());
        let output = stage.execute(&mut ctx).await;

        assert!(output.is_success());
        assert_eq!(ctx.document(), "<report>body</report>");
        assert_eq!(output.metadata.get("transform_type"), Some(&serde_json::json!("function")));
        assert_eq!(stage.params().len(), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_keeps_document() {
        let stage = TransformStage::new("broken", |_: &String, _: &HashMap<String, serde_json::Value>| {
            Err(anyhow::anyhow!("stylesheet missing"))
        });

        let mut ctx = ExecutionContext::new("body".to_string());
        let output = stage.execute(&mut ctx).await;

        assert!(output.is_failure());
        assert_eq!(ctx.document(), "body");
    }

    #[tokio::test]
    async fn test_output_stage_records_format() {
        let written = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = written.clone();
        let stage = OutputStage::new("emit", "json", move |doc: &String| {
            sink.lock().push(doc.clone());
            Ok(())
        });

        let mut ctx = ExecutionContext::new("payload".to_string());
        let output = stage.execute(&mut ctx).await;

        assert!(output.is_success());
        assert_eq!(stage.format(), "json");
        assert_eq!(output.metadata.get("format"), Some(&serde_json::json!("json")));
        assert_eq!(written.lock().as_slice(), ["payload".to_string()]);
    }

    #[test]
    fn test_preconditions() {
        let stage = TransformStage::new("t", |d: &String, _: &HashMap<String, serde_json::Value>| Ok(d.clone()))
            .with_precondition(|d: &String| !d.is_empty());

        assert!(stage.validate_input(&ExecutionContext::new("x".to_string())));
        assert!(!stage.validate_input(&ExecutionContext::new(String::new())));

        let custom = CustomStage::new("c", |_: &mut ExecutionContext<i32>| StageOutput::ok())
            .with_precondition(|ctx| ctx.get_variable("ready").is_some());
        assert!(!custom.validate_input(&ExecutionContext::new(0)));
        assert!(custom.validate_input(&ExecutionContext::new(0).with_variable("ready", true)));
    }

    #[tokio::test]
    async fn test_custom_stage_rollback_hook() {
        let stage = CustomStage::new("lock", |ctx: &mut ExecutionContext<i32>| {
            ctx.set_variable("locked", true);
            StageOutput::ok()
        })
        .with_rollback(|ctx| {
            ctx.set_variable("locked", false);
            Ok(())
        });

        let mut ctx = ExecutionContext::new(0);
        assert!(stage.execute(&mut ctx).await.is_success());
        assert!(stage.rollback(&mut ctx).await.is_ok());
        assert_eq!(ctx.get_variable("locked"), Some(&serde_json::json!(false)));
    }

    #[tokio::test]
    async fn test_custom_stage_rollback_error() {
        let stage = CustomStage::new("lock", |_: &mut ExecutionContext<i32>| StageOutput::ok())
            .with_rollback(|_| Err(anyhow::anyhow!("lock already released")));

        let mut ctx = ExecutionContext::new(0);
        let err = stage.rollback(&mut ctx).await.unwrap_err();
        assert_eq!(err.stage, "lock");
        assert_eq!(err.message, "lock already released");
    }
}
