//! The self-describing `documentation` action.

use bitbeat_core::{
    Action, ActionDefinition, ActionRegistry, ActionResult, BoxFuture, FieldSchema,
    LocalizedText, RequestContext,
};
use http::Method;
use serde_json::{json, Value};

use crate::error::DocsResult;
use crate::generator::DocumentationGenerator;

/// Action returning the documentation of every registered action.
///
/// Inputs:
///
/// | Field | Default | |
/// |---|---|---|
/// | `language` | `"en"` | preferred description language |
/// | `fallbackLanguage` | `"en"` | used when `language` has no text |
/// | `format` | `""` | reserved, currently ignored |
///
/// The reply is `{"documentation": {name: {version: entry}}}`.
#[derive(Debug)]
pub struct DocumentationAction {
    definition: ActionDefinition,
    generator: DocumentationGenerator,
}

impl DocumentationAction {
    /// Name the action registers under.
    pub const NAME: &'static str = "documentation";

    /// Creates the action. The generator is extended with the action's own
    /// definition so the documentation lists itself.
    #[must_use]
    pub fn new(generator: DocumentationGenerator) -> Self {
        let definition = Self::describe();
        Self {
            generator: generator.with_action(definition.clone()),
            definition,
        }
    }

    /// Returns the action's definition.
    #[must_use]
    pub fn describe() -> ActionDefinition {
        ActionDefinition::builder(Self::NAME)
            .methods([Method::GET, Method::POST])
            .strict(true)
            .description(LocalizedText::from(
                "Returns every web action of this server as documentation.",
            ))
            .tag("documentation")
            .input(
                "language",
                FieldSchema::string()
                    .required()
                    .default_value("en")
                    .example("de")
                    .description("Language the documentation is returned in."),
            )
            .input(
                "fallbackLanguage",
                FieldSchema::string()
                    .default_value("en")
                    .example("de")
                    .description("Language used when a text is missing in the requested one."),
            )
            .input(
                "format",
                FieldSchema::string()
                    .default_value("")
                    .example("openapi")
                    .description("Output format of the documentation."),
            )
            .output(
                "documentation",
                FieldSchema::object()
                    .required()
                    .example(json!({}))
                    .description("All actions available on this server."),
            )
            .build()
    }

    /// Creates the action and registers it in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`DocsError::Registry`](crate::DocsError::Registry) if a
    /// `documentation` action is already registered.
    pub fn register(
        generator: DocumentationGenerator,
        registry: &mut ActionRegistry,
    ) -> DocsResult<()> {
        registry.register(Self::new(generator))?;
        Ok(())
    }

    /// Returns the generator backing this action.
    #[must_use]
    pub fn generator(&self) -> &DocumentationGenerator {
        &self.generator
    }
}

impl Action for DocumentationAction {
    fn definition(&self) -> &ActionDefinition {
        &self.definition
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<Option<Value>>> {
        Box::pin(async move {
            let language = ctx
                .param("language")
                .and_then(Value::as_str)
                .unwrap_or("en");
            let fallback = ctx
                .param("fallbackLanguage")
                .and_then(Value::as_str)
                .unwrap_or("en");

            let documentation = self.generator.generate(language, fallback);
            Ok(Some(json!({ "documentation": documentation })))
        })
    }
}
