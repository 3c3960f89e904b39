//! Input validation stage.

use crate::stage::Stage;
use bitbeat_core::{
    Action, ActionError, ActionResult, BoxFuture, FieldSchema, FieldType, Params, RequestContext,
    Schema,
};
use futures_util::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Merges parameter sources and checks them against the input schema.
pub struct ValidationStage {
    action: Arc<dyn Action>,
}

impl ValidationStage {
    /// Creates the validation stage for an action.
    #[must_use]
    pub fn new(action: Arc<dyn Action>) -> Self {
        Self { action }
    }
}

impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            let inputs = self.action.definition().inputs();
            let merged = ctx.sources().merge(inputs);
            let validated = validate_inputs(inputs, merged).await?;
            ctx.set_params(validated);
            Ok(())
        })
    }
}

/// Checks a merged parameter bag against an input schema.
///
/// Every declared field is checked concurrently and the first rejection
/// wins. A field that is absent (or `null`) takes its default; a required
/// field without one fails with `MissingRequiredInput`. Present values must
/// match the declared type, then pass the validator if one is attached.
/// Returns the bag with defaults applied. Undeclared keys pass through.
pub async fn validate_inputs(inputs: &Schema, mut params: Params) -> ActionResult<Params> {
    let provided: Vec<Option<Value>> = inputs
        .keys()
        .map(|name| params.get(name).filter(|v| !v.is_null()).cloned())
        .collect();

    let checks = inputs
        .iter()
        .zip(provided)
        .map(|((name, schema), value)| check_field(name, schema, value));
    let defaults = try_join_all(checks).await?;

    for (name, default) in inputs.keys().zip(defaults) {
        if let Some(value) = default {
            params.insert(name.clone(), value);
        }
    }
    Ok(params)
}

/// Checks one field. Returns the default when it had to be applied.
async fn check_field(
    name: &str,
    schema: &FieldSchema,
    provided: Option<Value>,
) -> ActionResult<Option<Value>> {
    let (value, defaulted) = match provided {
        Some(value) => (value, false),
        None => match schema.default() {
            Some(default) => (default.clone(), true),
            None if schema.is_required() => {
                debug!(field = name, "missing required input");
                return Err(ActionError::missing_input(name));
            }
            None => return Ok(None),
        },
    };

    if let Some(actual) = FieldType::of(&value) {
        if actual != schema.field_type() {
            return Err(ActionError::type_mismatch(name, schema.field_type(), actual));
        }
    }

    if let Some(validator) = schema.validator_fn() {
        validator(&value, name)
            .await
            .map_err(|message| ActionError::validation_failed(name, message))?;
    }

    Ok(defaulted.then_some(value))
}
