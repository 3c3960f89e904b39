//! Actions and their definitions.
//!
//! An [`Action`] is a named, versioned unit of request logic. Its static
//! metadata lives in an [`ActionDefinition`]: allowed methods, content type,
//! strictness flags, input and output schemas, description and attached
//! middleware. The same name may be registered at several versions, each as
//! its own action.

use crate::context::RequestContext;
use crate::error::ActionResult;
use crate::i18n::LocalizedText;
use crate::middleware::ActionMiddleware;
use crate::schema::{FieldSchema, Schema};
use crate::BoxFuture;
use http::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Content type actions produce unless told otherwise.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Static metadata describing an action.
#[derive(Clone)]
pub struct ActionDefinition {
    name: String,
    version: u32,
    methods: Vec<Method>,
    content_type: String,
    output_strict: bool,
    accept_strict: bool,
    inputs: Schema,
    outputs: Schema,
    description: Option<LocalizedText>,
    deprecated: bool,
    tags: Vec<String>,
    middlewares: Vec<Arc<dyn ActionMiddleware>>,
}

impl ActionDefinition {
    /// Starts building a definition for `name` at version 1.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ActionDefinitionBuilder {
        ActionDefinitionBuilder::new(name)
    }

    /// Returns the action name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the action version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the allowed HTTP methods.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Returns the content type the action produces.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns `true` if outputs are filtered against the output schema.
    #[must_use]
    pub const fn is_output_strict(&self) -> bool {
        self.output_strict
    }

    /// Returns `true` if the accept header must match the content type.
    #[must_use]
    pub const fn is_accept_strict(&self) -> bool {
        self.accept_strict
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn inputs(&self) -> &Schema {
        &self.inputs
    }

    /// Returns the output schema.
    #[must_use]
    pub const fn outputs(&self) -> &Schema {
        &self.outputs
    }

    /// Returns the description.
    #[must_use]
    pub const fn description(&self) -> Option<&LocalizedText> {
        self.description.as_ref()
    }

    /// Returns `true` if the action is deprecated.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    /// Returns the tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the attached middleware in registration order.
    #[must_use]
    pub fn middlewares(&self) -> &[Arc<dyn ActionMiddleware>] {
        &self.middlewares
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let middlewares: Vec<_> = self.middlewares.iter().map(|m| m.name()).collect();
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("methods", &self.methods)
            .field("content_type", &self.content_type)
            .field("output_strict", &self.output_strict)
            .field("accept_strict", &self.accept_strict)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("deprecated", &self.deprecated)
            .field("tags", &self.tags)
            .field("middlewares", &middlewares)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ActionDefinition`].
///
/// # Example
///
/// ```
/// use bitbeat_core::{ActionDefinition, FieldSchema};
/// use http::Method;
///
/// let definition = ActionDefinition::builder("login")
///     .version(2)
///     .methods([Method::POST])
///     .strict(true)
///     .input("user", FieldSchema::string().required())
///     .output("token", FieldSchema::string().required())
///     .description("Exchanges credentials for a token")
///     .build();
///
/// assert_eq!(definition.version(), 2);
/// assert!(definition.is_output_strict());
/// assert!(definition.is_accept_strict());
/// ```
#[derive(Debug)]
#[must_use]
pub struct ActionDefinitionBuilder {
    definition: ActionDefinition,
}

impl ActionDefinitionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            definition: ActionDefinition {
                name: name.into(),
                version: 1,
                methods: vec![Method::GET, Method::POST],
                content_type: DEFAULT_CONTENT_TYPE.to_string(),
                output_strict: false,
                accept_strict: false,
                inputs: Schema::new(),
                outputs: Schema::new(),
                description: None,
                deprecated: false,
                tags: Vec::new(),
                middlewares: Vec::new(),
            },
        }
    }

    /// Sets the version.
    pub fn version(mut self, version: u32) -> Self {
        self.definition.version = version;
        self
    }

    /// Replaces the allowed methods.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.definition.methods = methods.into_iter().collect();
        self
    }

    /// Sets the produced content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.definition.content_type = content_type.into();
        self
    }

    /// Sets both output and accept-type strictness.
    pub fn strict(mut self, strict: bool) -> Self {
        self.definition.output_strict = strict;
        self.definition.accept_strict = strict;
        self
    }

    /// Sets output strictness only.
    pub fn output_strict(mut self, strict: bool) -> Self {
        self.definition.output_strict = strict;
        self
    }

    /// Sets accept-type strictness only.
    pub fn accept_strict(mut self, strict: bool) -> Self {
        self.definition.accept_strict = strict;
        self
    }

    /// Declares an input field.
    pub fn input(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.definition.inputs.insert(name.into(), schema);
        self
    }

    /// Declares an output field.
    pub fn output(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.definition.outputs.insert(name.into(), schema);
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<LocalizedText>) -> Self {
        self.definition.description = Some(description.into());
        self
    }

    /// Marks the action as deprecated.
    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.definition.deprecated = deprecated;
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.definition.tags.push(tag.into());
        self
    }

    /// Attaches a middleware. Hooks run in attachment order.
    pub fn middleware(mut self, middleware: impl ActionMiddleware) -> Self {
        self.definition.middlewares.push(Arc::new(middleware));
        self
    }

    /// Attaches a shared middleware.
    pub fn middleware_arc(mut self, middleware: Arc<dyn ActionMiddleware>) -> Self {
        self.definition.middlewares.push(middleware);
        self
    }

    /// Builds the definition.
    #[must_use]
    pub fn build(self) -> ActionDefinition {
        self.definition
    }
}

/// A named, versioned unit of request logic.
///
/// The body receives the context after validation and formatting. It may
/// mutate [`RequestContext::result_mut`] in place or return a replacement
/// value; a returned value takes precedence.
///
/// # Example
///
/// ```
/// use bitbeat_core::{Action, ActionDefinition, ActionResult, BoxFuture, FieldSchema, RequestContext};
/// use serde_json::{json, Value};
///
/// struct Greet {
///     definition: ActionDefinition,
/// }
///
/// impl Greet {
///     fn new() -> Self {
///         let definition = ActionDefinition::builder("greet")
///             .input("name", FieldSchema::string().default_value("world"))
///             .build();
///         Self { definition }
///     }
/// }
///
/// impl Action for Greet {
///     fn definition(&self) -> &ActionDefinition {
///         &self.definition
///     }
///
///     fn run<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, ActionResult<Option<Value>>> {
///         Box::pin(async move {
///             let name = ctx.param("name").and_then(Value::as_str).unwrap_or_default();
///             Ok(Some(json!({ "greeting": format!("hello {name}") })))
///         })
///     }
/// }
/// ```
pub trait Action: Send + Sync + 'static {
    /// Returns the action's static metadata.
    fn definition(&self) -> &ActionDefinition;

    /// Runs the action body.
    fn run<'a>(&'a self, ctx: &'a mut RequestContext)
        -> BoxFuture<'a, ActionResult<Option<Value>>>;
}

type RunFn = dyn for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, ActionResult<Option<Value>>>
    + Send
    + Sync;

/// An action backed by a closure.
///
/// # Example
///
/// ```
/// use bitbeat_core::{ActionDefinition, FnAction};
/// use serde_json::json;
///
/// let ping = FnAction::from_sync(ActionDefinition::builder("ping").build(), |_ctx| {
///     Ok(Some(json!({ "pong": true })))
/// });
/// ```
pub struct FnAction {
    definition: ActionDefinition,
    run: Box<RunFn>,
}

impl FnAction {
    /// Creates an action from an async closure returning a boxed future.
    pub fn new<F>(definition: ActionDefinition, run: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, ActionResult<Option<Value>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            definition,
            run: Box::new(run),
        }
    }

    /// Creates an action from a synchronous closure.
    pub fn from_sync<F>(definition: ActionDefinition, run: F) -> Self
    where
        F: Fn(&mut RequestContext) -> ActionResult<Option<Value>> + Send + Sync + 'static,
    {
        Self::new(definition, move |ctx| {
            let outcome = run(ctx);
            Box::pin(std::future::ready(outcome))
        })
    }
}

impl Action for FnAction {
    fn definition(&self) -> &ActionDefinition {
        &self.definition
    }

    fn run<'a>(&'a self, ctx: &'a mut RequestContext)
        -> BoxFuture<'a, ActionResult<Option<Value>>> {
        (self.run)(ctx)
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Noop;

    impl ActionMiddleware for Noop {
        fn name(&self) -> &'static str {
            "noop"
        }
    }

    #[test]
    fn test_definition_defaults() {
        let definition = ActionDefinition::builder("status").build();
        assert_eq!(definition.name(), "status");
        assert_eq!(definition.version(), 1);
        assert_eq!(definition.methods(), &[Method::GET, Method::POST]);
        assert_eq!(definition.content_type(), "application/json");
        assert!(!definition.is_output_strict());
        assert!(!definition.is_accept_strict());
        assert!(!definition.is_deprecated());
        assert!(definition.inputs().is_empty());
        assert!(definition.middlewares().is_empty());
    }

    #[test]
    fn test_strict_flags_are_independent() {
        let output_only = ActionDefinition::builder("a").output_strict(true).build();
        assert!(output_only.is_output_strict());
        assert!(!output_only.is_accept_strict());

        let accept_only = ActionDefinition::builder("b").accept_strict(true).build();
        assert!(!accept_only.is_output_strict());
        assert!(accept_only.is_accept_strict());

        let relaxed = ActionDefinition::builder("c")
            .strict(true)
            .accept_strict(false)
            .build();
        assert!(relaxed.is_output_strict());
        assert!(!relaxed.is_accept_strict());
    }

    #[test]
    fn test_schema_order_preserved() {
        let definition = ActionDefinition::builder("order")
            .input("zeta", FieldSchema::string())
            .input("alpha", FieldSchema::number())
            .input("mid", FieldSchema::boolean())
            .build();
        let names: Vec<_> = definition.inputs().keys().cloned().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_debug_lists_middleware_names() {
        let definition = ActionDefinition::builder("x").middleware(Noop).build();
        assert!(format!("{definition:?}").contains("noop"));
    }

    #[tokio::test]
    async fn test_fn_action_sync() {
        let action = FnAction::from_sync(ActionDefinition::builder("echo").build(), |ctx| {
            Ok(ctx.param("value").cloned())
        });
        let mut ctx = RequestContext::builder().build();
        ctx.params_mut().insert("value".into(), json!(3));
        assert_eq!(action.run(&mut ctx).await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_fn_action_async_mutates_result() {
        let action = FnAction::new(ActionDefinition::builder("mutate").build(), |ctx| {
            Box::pin(async move {
                ctx.result_mut()["done"] = json!(true);
                Ok(None)
            })
        });
        let mut ctx = RequestContext::builder().build();
        assert!(action.run(&mut ctx).await.unwrap().is_none());
        assert_eq!(ctx.result()["done"], true);
    }
}
