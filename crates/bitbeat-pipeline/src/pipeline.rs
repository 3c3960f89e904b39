//! The per-action stage sequence.
//!
//! A [`Pipeline`] holds four ordered stage slots for one action, matching
//! the callbacks an HTTP engine invokes per request:
//!
//! | Slot | Default stage |
//! |---|---|
//! | `pre_validation` | [`ValidationStage`], optionally preceded by extra stages |
//! | `pre_handler` | [`FormatStage`] |
//! | `handler` | [`ExecutionStage`] |
//! | `pre_serialization` | [`OutputStage`] |

use crate::stage::{BoxedStage, Stage, StageChain};
use crate::stages::{ExecutionStage, FormatStage, OutputStage, ValidationStage};
use bitbeat_core::{Action, ActionDefinition, ActionResult, RequestContext};
use std::sync::Arc;
use tracing::debug;

/// Four ordered stages bound to one action.
pub struct Pipeline {
    action: Arc<dyn Action>,
    pre_validation: BoxedStage,
    pre_handler: BoxedStage,
    handler: BoxedStage,
    pre_serialization: BoxedStage,
}

impl Pipeline {
    /// Creates a pipeline builder for an action.
    #[must_use]
    pub fn builder(action: Arc<dyn Action>) -> PipelineBuilder {
        PipelineBuilder::new(action)
    }

    /// Creates the default pipeline for an action.
    #[must_use]
    pub fn for_action(action: Arc<dyn Action>) -> Self {
        Self::builder(action).build()
    }

    /// Returns the action this pipeline runs.
    #[must_use]
    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    /// Returns the action's definition.
    #[must_use]
    pub fn definition(&self) -> &ActionDefinition {
        self.action.definition()
    }

    /// Returns the stage slots in run order.
    #[must_use]
    pub fn stages(&self) -> [&BoxedStage; 4] {
        [
            &self.pre_validation,
            &self.pre_handler,
            &self.handler,
            &self.pre_serialization,
        ]
    }

    /// Returns the stage names in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages().iter().map(|s| s.name()).collect()
    }

    /// Runs all four stages over a request context.
    ///
    /// Each stage completes before the next one starts. The first failure is
    /// returned and later stages are skipped.
    pub async fn process(&self, ctx: &mut RequestContext) -> ActionResult<()> {
        for stage in self.stages() {
            if let Err(error) = stage.run(ctx).await {
                debug!(
                    stage = stage.name(),
                    action = self.definition().name(),
                    version = self.definition().version(),
                    request_id = %ctx.request_id(),
                    error = %error,
                    "stage failed"
                );
                return Err(error);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("action", &self.definition().name())
            .field("version", &self.definition().version())
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for [`Pipeline`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bitbeat_core::{ActionDefinition, FnAction};
/// use bitbeat_pipeline::{FnStage, Pipeline};
///
/// let action = Arc::new(FnAction::from_sync(ActionDefinition::builder("ping").build(), |_| Ok(None)));
/// let pipeline = Pipeline::builder(action)
///     .before_validation(Arc::new(FnStage::new("audit", |_ctx| Box::pin(async { Ok(()) }))))
///     .build();
///
/// assert_eq!(pipeline.stage_names(), ["validation", "format", "execution", "output"]);
/// ```
#[must_use]
pub struct PipelineBuilder {
    action: Arc<dyn Action>,
    before_validation: Vec<BoxedStage>,
}

impl PipelineBuilder {
    fn new(action: Arc<dyn Action>) -> Self {
        Self {
            action,
            before_validation: Vec::new(),
        }
    }

    /// Adds a stage that runs at the start of the validation slot.
    ///
    /// Stages added this way run in the order they were added, before input
    /// validation.
    pub fn before_validation(mut self, stage: BoxedStage) -> Self {
        self.before_validation.push(stage);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let validation: BoxedStage = Arc::new(ValidationStage::new(Arc::clone(&self.action)));
        let pre_validation: BoxedStage = if self.before_validation.is_empty() {
            validation
        } else {
            let mut chained = self.before_validation;
            chained.push(validation);
            Arc::new(StageChain::new("validation", chained))
        };

        Pipeline {
            pre_validation,
            pre_handler: Arc::new(FormatStage::new(Arc::clone(&self.action))),
            handler: Arc::new(ExecutionStage::new(Arc::clone(&self.action))),
            pre_serialization: Arc::new(OutputStage::new(Arc::clone(&self.action))),
            action: self.action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::FnStage;
    use bitbeat_core::{ActionError, FieldSchema, FnAction};
    use serde_json::json;

    #[tokio::test]
    async fn test_default_stage_order() {
        let action = Arc::new(FnAction::from_sync(
            ActionDefinition::builder("a").build(),
            |_| Ok(None),
        ));
        let pipeline = Pipeline::for_action(action);
        assert_eq!(
            pipeline.stage_names(),
            ["validation", "format", "execution", "output"]
        );
    }

    #[tokio::test]
    async fn test_before_validation_runs_first() {
        let action = Arc::new(FnAction::from_sync(
            ActionDefinition::builder("a")
                .input("name", FieldSchema::string().required())
                .build(),
            |_| Ok(None),
        ));
        let pipeline = Pipeline::builder(action)
            .before_validation(Arc::new(FnStage::new("gate", |_ctx| {
                Box::pin(async { Err(ActionError::connection_rejected("blocked")) })
            })))
            .build();

        let mut ctx = RequestContext::builder().build();
        let err = pipeline.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), "CONNECTION_REJECTED");
    }

    #[tokio::test]
    async fn test_validation_failure_skips_action() {
        let action = Arc::new(FnAction::from_sync(
            ActionDefinition::builder("a")
                .input("name", FieldSchema::string().required())
                .build(),
            |_| Err(ActionError::internal("must not run")),
        ));
        let pipeline = Pipeline::for_action(action);
        let mut ctx = RequestContext::builder().build();
        let err = pipeline.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_REQUIRED_INPUT");
    }

    #[tokio::test]
    async fn test_full_run() {
        let action = Arc::new(FnAction::from_sync(
            ActionDefinition::builder("greet")
                .strict(true)
                .input(
                    "name",
                    FieldSchema::string()
                        .required()
                        .formatter(|v, _| Ok(json!(v.as_str().unwrap_or_default().trim()))),
                )
                .output("greeting", FieldSchema::string().required())
                .build(),
            |ctx| {
                let name = ctx.param("name").and_then(|v| v.as_str()).unwrap_or_default();
                Ok(Some(json!({"greeting": format!("hi {name}"), "debug": 1})))
            },
        ));
        let pipeline = Pipeline::for_action(action);
        let mut ctx = RequestContext::builder()
            .body_param("name", json!("  ada "))
            .build();
        pipeline.process(&mut ctx).await.unwrap();
        assert_eq!(ctx.result(), &json!({"greeting": "hi ada"}));
        assert_eq!(ctx.response().content_type(), Some("application/json"));
    }
}
