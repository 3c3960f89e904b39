//! Input format stage.

use crate::stage::Stage;
use bitbeat_core::{Action, ActionError, ActionResult, BoxFuture, Params, RequestContext, Schema};
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing::error;

/// Runs field formatters over already validated parameters.
pub struct FormatStage {
    action: Arc<dyn Action>,
}

impl FormatStage {
    /// Creates the format stage for an action.
    #[must_use]
    pub fn new(action: Arc<dyn Action>) -> Self {
        Self { action }
    }
}

impl Stage for FormatStage {
    fn name(&self) -> &'static str {
        "format"
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            let inputs = self.action.definition().inputs();
            if !inputs.values().any(|field| field.has_formatter()) {
                return Ok(());
            }
            let params = std::mem::take(ctx.params_mut());
            let formatted = format_inputs(inputs, params).await?;
            ctx.set_params(formatted);
            Ok(())
        })
    }
}

/// Applies every declared formatter to its present value.
///
/// Fields without a formatter, and absent fields, pass through. Formatted
/// values replace the originals in the returned bag. A formatter failure is
/// a server fault and yields `FormatFailed`.
pub async fn format_inputs(inputs: &Schema, mut params: Params) -> ActionResult<Params> {
    let jobs: Vec<_> = inputs
        .iter()
        .filter_map(|(name, field)| {
            let formatter = field.formatter_fn()?;
            let value = params.get(name).filter(|v| !v.is_null())?;
            let pending = formatter(value, name);
            Some(async move {
                match pending.await {
                    Ok(formatted) => Ok((name.clone(), formatted)),
                    Err(cause) => {
                        error!(field = %name, error = %cause, "formatter failed");
                        Err(ActionError::format_failed(name.as_str(), cause.to_string()))
                    }
                }
            })
        })
        .collect();

    for (name, value) in try_join_all(jobs).await? {
        params.insert(name, value);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbeat_core::FieldSchema;
    use serde_json::{json, Value};

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    #[tokio::test]
    async fn test_formatters_write_back() {
        let mut inputs = Schema::new();
        inputs.insert(
            "email".into(),
            FieldSchema::string().formatter(|v, _| {
                Ok(json!(v.as_str().unwrap_or_default().to_lowercase()))
            }),
        );
        inputs.insert("name".into(), FieldSchema::string());

        let formatted = format_inputs(&inputs, params(json!({"email": "A@B.C", "name": "Ada"})))
            .await
            .unwrap();
        assert_eq!(formatted["email"], "a@b.c");
        assert_eq!(formatted["name"], "Ada");
    }

    #[tokio::test]
    async fn test_absent_fields_skip_formatter() {
        let mut inputs = Schema::new();
        inputs.insert(
            "tag".into(),
            FieldSchema::string().formatter(|_, _| anyhow::bail!("must not run")),
        );
        let formatted = format_inputs(&inputs, Params::new()).await.unwrap();
        assert!(formatted.is_empty());
    }

    #[tokio::test]
    async fn test_formatter_failure_is_server_error() {
        let mut inputs = Schema::new();
        inputs.insert(
            "n".into(),
            FieldSchema::number().formatter(|_, _| anyhow::bail!("overflow")),
        );
        let err = format_inputs(&inputs, params(json!({"n": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORMAT_FAILED");
        assert_eq!(err.category(), bitbeat_core::ErrorCategory::ServerProcessing);
        assert!(err.to_string().contains("overflow"));
    }

    #[tokio::test]
    async fn test_async_formatter() {
        let mut inputs = Schema::new();
        inputs.insert(
            "n".into(),
            FieldSchema::number().formatter_async(|v, _| async move {
                tokio::task::yield_now().await;
                Ok(json!(v.as_i64().unwrap_or_default() * 10))
            }),
        );
        let formatted = format_inputs(&inputs, params(json!({"n": 4}))).await.unwrap();
        assert_eq!(formatted["n"], json!(40));
    }
}
