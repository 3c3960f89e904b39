//! Output shaping stage.

use crate::hooks;
use crate::stage::Stage;
use bitbeat_core::{Action, ActionError, ActionResult, BoxFuture, RequestContext, Schema};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Runs `after_run` hooks and, for output-strict actions, filters the result.
pub struct OutputStage {
    action: Arc<dyn Action>,
}

impl OutputStage {
    /// Creates the output stage for an action.
    #[must_use]
    pub fn new(action: Arc<dyn Action>) -> Self {
        Self { action }
    }
}

impl Stage for OutputStage {
    fn name(&self) -> &'static str {
        "output"
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<()>> {
        Box::pin(async move {
            let definition = self.action.definition();
            hooks::after_run(definition, ctx).await?;

            if definition.is_output_strict() {
                let payload = ctx.take_result();
                let shaped = shape_output(definition.outputs(), payload)?;
                ctx.set_result(shaped);
            }
            Ok(())
        })
    }
}

/// Filters a payload down to the declared outputs.
///
/// Absent (or `null`) fields take their default; a required field that is
/// still absent fails with `MissingRequiredOutput`. A present field whose
/// runtime type differs from the declared one is dropped, not reported.
/// Undeclared fields are dropped. A non-object payload is treated as empty.
pub fn shape_output(outputs: &Schema, payload: Value) -> ActionResult<Value> {
    let mut source = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut shaped = Map::new();
    for (name, field) in outputs {
        let value = match source.remove(name).filter(|v| !v.is_null()) {
            Some(value) => value,
            None => match field.default() {
                Some(default) => default.clone(),
                None if field.is_required() => return Err(ActionError::missing_output(name.as_str())),
                None => continue,
            },
        };

        if field.field_type().matches(&value) {
            shaped.insert(name.clone(), value);
        } else {
            debug!(field = %name, expected = %field.field_type(), "dropping mistyped output field");
        }
    }
    Ok(Value::Object(shaped))
}
