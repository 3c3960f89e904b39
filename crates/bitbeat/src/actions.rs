//! Built-in actions.

use bitbeat_core::{
    Action, ActionDefinition, ActionResult, BoxFuture, FieldSchema, LocalizedText, RequestContext,
};
use http::Method;
use serde_json::{json, Value};

/// Liveness probe answering `{}`.
#[derive(Debug)]
pub struct StatusAction {
    definition: ActionDefinition,
}

impl StatusAction {
    /// Name the action registers under.
    pub const NAME: &'static str = "status";

    /// Creates the action.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definition: ActionDefinition::builder(Self::NAME)
                .methods([Method::GET])
                .strict(true)
                .description(
                    LocalizedText::from("Reports that the server is up.")
                        .with("de", "Meldet, dass der Server läuft."),
                )
                .tag("status")
                .build(),
        }
    }
}

impl Default for StatusAction {
    fn default() -> Self {
        Self::new()
    }
}

impl Action for StatusAction {
    fn definition(&self) -> &ActionDefinition {
        &self.definition
    }

    fn run<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<Option<Value>>> {
        Box::pin(async { Ok(Some(json!({}))) })
    }
}

/// Reports the application version it was created with.
#[derive(Debug)]
pub struct VersionAction {
    definition: ActionDefinition,
    version: String,
}

impl VersionAction {
    /// Name the action registers under.
    pub const NAME: &'static str = "version";

    /// Creates the action for an application version.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            definition: ActionDefinition::builder(Self::NAME)
                .methods([Method::GET])
                .strict(true)
                .description(
                    LocalizedText::from("Returns the application version.")
                        .with("de", "Gibt die Version der Anwendung zurück."),
                )
                .tag("version")
                .output(
                    "version",
                    FieldSchema::string()
                        .required()
                        .example("0.0.1")
                        .description("Semantic version of the application."),
                )
                .build(),
            version: version.into(),
        }
    }

    /// Returns the reported version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Action for VersionAction {
    fn definition(&self) -> &ActionDefinition {
        &self.definition
    }

    fn run<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<Option<Value>>> {
        Box::pin(async move { Ok(Some(json!({ "version": self.version }))) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbeat_pipeline::Pipeline;
    use std::sync::Arc;

    #[test]
    fn test_definitions() {
        let status = StatusAction::new();
        let definition = status.definition();
        assert_eq!(definition.name(), "status");
        assert_eq!(definition.version(), 1);
        assert_eq!(definition.methods(), [Method::GET]);
        assert!(definition.is_output_strict());
        assert!(definition.is_accept_strict());
        assert!(definition.outputs().is_empty());
        assert_eq!(definition.tags(), ["status"]);

        let version = VersionAction::new("1.2.3");
        let output = version.definition().outputs().get("version").unwrap();
        assert!(output.is_required());
        assert_eq!(output.example_value(), Some(&json!("0.0.1")));
    }

    #[tokio::test]
    async fn test_status_replies_empty_object() {
        let pipeline = Pipeline::for_action(Arc::new(StatusAction::new()));
        let mut ctx = RequestContext::builder().build();
        pipeline.process(&mut ctx).await.unwrap();
        assert_eq!(ctx.result(), &json!({}));
    }

    #[tokio::test]
    async fn test_version_replies_configured_version() {
        let pipeline = Pipeline::for_action(Arc::new(VersionAction::new("1.2.3")));
        let mut ctx = RequestContext::builder().build();
        pipeline.process(&mut ctx).await.unwrap();
        assert_eq!(ctx.result(), &json!({"version": "1.2.3"}));
    }
}
