//! Execution stage.

use crate::hooks;
use crate::stage::Stage;
use bitbeat_core::{Action, ActionError, ActionResult, BoxFuture, RequestContext};
use http::header::ACCEPT;
use std::sync::Arc;
use tracing::debug;

/// Negotiates the content type, runs `before_run` hooks and the action body.
pub struct ExecutionStage {
    action: Arc<dyn Action>,
}

impl ExecutionStage {
    /// Creates the execution stage for an action.
    #[must_use]
    pub fn new(action: Arc<dyn Action>) -> Self {
        Self { action }
    }
}

impl Stage for ExecutionStage {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            let definition = self.action.definition();

            if definition.is_accept_strict() {
                if let Some(accept) = ctx.header(ACCEPT.as_str()) {
                    if !accepts(accept, definition.content_type()) {
                        return Err(ActionError::accept_mismatch(
                            accept,
                            definition.content_type(),
                        ));
                    }
                }
            }

            hooks::before_run(definition, ctx).await?;

            if let Some(result) = self.action.run(ctx).await? {
                ctx.set_result(result);
            }
            debug!(
                action = definition.name(),
                version = definition.version(),
                "action completed"
            );

            ctx.response_mut().set_content_type(definition.content_type());
            Ok(())
        })
    }
}

/// Returns `true` if an accept header admits `content_type`.
///
/// The header is a comma separated list of media ranges; parameters such as
/// `q` are ignored. `*/*`, `type/*` and an exact match on the media type
/// all admit it.
#[must_use]
pub fn accepts(accept: &str, content_type: &str) -> bool {
    let wanted = essence(content_type);
    let (wanted_type, _) = wanted.split_once('/').unwrap_or((wanted.as_str(), ""));

    accept.split(',').map(essence).any(|range| {
        if range.is_empty() || range == "*/*" || range == "*" {
            return true;
        }
        match range.split_once('/') {
            Some((kind, "*")) => kind == wanted_type,
            _ => range == wanted,
        }
    })
}

fn essence(media: &str) -> String {
    media
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
