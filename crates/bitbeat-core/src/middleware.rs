//! Action middleware.
//!
//! Middleware attached to an action wraps its execution with two hooks:
//! [`ActionMiddleware::before_run`] runs before the action body and
//! [`ActionMiddleware::after_run`] runs over the produced payload. Hooks of
//! all middleware attached to an action run one at a time in registration
//! order; the first failure aborts the remaining hooks and the request.

use crate::action::ActionDefinition;
use crate::context::RequestContext;
use crate::error::ActionResult;
use crate::BoxFuture;

/// Hooks run around an action's execution.
///
/// Both hooks default to doing nothing, so implementors override only what
/// they need.
///
/// # Example
///
/// ```
/// use bitbeat_core::{ActionDefinition, ActionMiddleware, ActionResult, BoxFuture, RequestContext};
/// use serde_json::json;
///
/// struct Stamp;
///
/// impl ActionMiddleware for Stamp {
///     fn name(&self) -> &'static str {
///         "stamp"
///     }
///
///     fn after_run<'a>(
///         &'a self,
///         _action: &'a ActionDefinition,
///         ctx: &'a mut RequestContext,
///     ) -> BoxFuture<'a, ActionResult<()>> {
///         Box::pin(async move {
///             ctx.result_mut()["servedBy"] = json!("bitbeat");
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait ActionMiddleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs.
    fn name(&self) -> &'static str;

    /// Runs before the action body, with access to the result and raw request.
    fn before_run<'a>(
        &'a self,
        action: &'a ActionDefinition,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, ActionResult<()>> {
        let _ = (action, ctx);
        Box::pin(async { Ok(()) })
    }

    /// Runs after the action body over the produced payload.
    ///
    /// The payload is the context's result and may be mutated in place.
    fn after_run<'a>(
        &'a self,
        action: &'a ActionDefinition,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, ActionResult<()>> {
        let _ = (action, ctx);
        Box::pin(async { Ok(()) })
    }
}
