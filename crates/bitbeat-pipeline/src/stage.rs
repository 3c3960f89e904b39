//! The stage trait.
//!
//! A [`Stage`] is one step of the request pipeline. It receives the mutable
//! request context and either completes or fails with an [`ActionError`],
//! which ends the request.
//!
//! [`ActionError`]: bitbeat_core::ActionError

use bitbeat_core::{ActionResult, BoxFuture, RequestContext};
use std::sync::Arc;

/// A type-erased stage that can be stored in a route registration.
pub type BoxedStage = Arc<dyn Stage>;

/// One step of the request pipeline.
pub trait Stage: Send + Sync + 'static {
    /// Returns the name of this stage, used in logs.
    fn name(&self) -> &'static str;

    /// Runs the stage over the request context.
    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>>;
}

/// Several stages run back to back under one name.
///
/// The first failing stage stops the chain.
pub struct StageChain {
    name: &'static str,
    stages: Vec<BoxedStage>,
}

impl StageChain {
    /// Creates a chain from stages in run order.
    #[must_use]
    pub fn new(name: &'static str, stages: Vec<BoxedStage>) -> Self {
        Self { name, stages }
    }

    /// Returns the names of the chained stages in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Stage for StageChain {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            for stage in &self.stages {
                stage.run(ctx).await?;
            }
            Ok(())
        })
    }
}

/// A stage created from a closure.
///
/// # Example
///
/// ```
/// use bitbeat_pipeline::FnStage;
/// use serde_json::json;
///
/// let stamp = FnStage::new("stamp", |ctx| {
///     Box::pin(async move {
///         ctx.result_mut()["stamped"] = json!(true);
///         Ok(())
///     })
/// });
/// ```
pub struct FnStage<F> {
    name: &'static str,
    func: F,
}

impl<F> FnStage<F> {
    /// Creates a new closure-backed stage.
    pub fn new(name: &'static str, func: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self { name, func }
    }
}

impl<F> Stage for FnStage<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbeat_core::ActionError;
    use serde_json::json;

    fn push(name: &'static str) -> BoxedStage {
        Arc::new(FnStage::new(name, move |ctx| {
            Box::pin(async move {
                if let Some(list) = ctx.result_mut().as_object_mut() {
                    let position = list.len();
                    list.insert(name.to_string(), json!(position));
                }
                Ok(())
            })
        }))
    }

    fn fail() -> BoxedStage {
        Arc::new(FnStage::new("fail", |_ctx| {
            Box::pin(async { Err(ActionError::bad_request("stop")) })
        }))
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let chain = StageChain::new("chain", vec![push("a"), push("b")]);
        let mut ctx = RequestContext::builder().build();
        chain.run(&mut ctx).await.unwrap();
        assert_eq!(ctx.result(), &json!({"a": 0, "b": 1}));
        assert_eq!(chain.stage_names(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_chain_stops_on_failure() {
        let chain = StageChain::new("chain", vec![push("a"), fail(), push("c")]);
        let mut ctx = RequestContext::builder().build();
        let err = chain.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
        assert_eq!(ctx.result(), &json!({"a": 0}));
    }
}
