//! Sequential hook runners.
//!
//! Action middleware hooks run with an effective concurrency of one: each
//! hook fully completes before the next starts, in registration order, and
//! the first failure returns immediately without running later hooks.

use bitbeat_core::{ActionDefinition, ActionResult, RequestContext};
use tracing::warn;

/// Runs every attached middleware's `before_run` hook.
pub async fn before_run(action: &ActionDefinition, ctx: &mut RequestContext) -> ActionResult<()> {
    for middleware in action.middlewares() {
        if let Err(error) = middleware.before_run(action, ctx).await {
            warn!(
                middleware = middleware.name(),
                action = action.name(),
                version = action.version(),
                error = %error,
                "before_run hook failed"
            );
            return Err(error);
        }
    }
    Ok(())
}

/// Runs every attached middleware's `after_run` hook.
pub async fn after_run(action: &ActionDefinition, ctx: &mut RequestContext) -> ActionResult<()> {
    for middleware in action.middlewares() {
        if let Err(error) = middleware.after_run(action, ctx).await {
            warn!(
                middleware = middleware.name(),
                action = action.name(),
                version = action.version(),
                error = %error,
                "after_run hook failed"
            );
            return Err(error);
        }
    }
    Ok(())
}
