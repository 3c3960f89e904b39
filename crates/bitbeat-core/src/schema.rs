//! Field schemas.
//!
//! A [`FieldSchema`] is the declared contract for one input or output field
//! of an action: its primitive type, whether it is required, an optional
//! default and example, a localized description, and optional validator and
//! formatter callbacks.

use crate::i18n::LocalizedText;
use crate::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Ordered mapping of field name to schema.
pub type Schema = IndexMap<String, FieldSchema>;

/// Validator callback: receives the value and the field name, rejects with a message.
pub type FieldValidator =
    Arc<dyn Fn(&Value, &str) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Formatter callback: receives the validated value and the field name, returns the replacement.
pub type FieldFormatter =
    Arc<dyn Fn(&Value, &str) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Primitive type tag of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON object or array.
    Object,
}

impl FieldType {
    /// Returns the runtime type tag of a JSON value.
    ///
    /// `null` has no tag. Arrays are reported as [`FieldType::Object`].
    #[must_use]
    pub const fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(_) => Some(Self::Number),
            Value::String(_) => Some(Self::String),
            Value::Array(_) | Value::Object(_) => Some(Self::Object),
        }
    }

    /// Returns `true` if the value's runtime type matches this tag.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        Self::of(value) == Some(self)
    }

    /// Returns the lowercase type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared contract for one input or output field.
///
/// # Example
///
/// ```
/// use bitbeat_core::{FieldSchema, FieldType};
/// use serde_json::json;
///
/// let count = FieldSchema::number()
///     .default_value(json!(5))
///     .description("How many items to return")
///     .validator(|value, name| match value.as_f64() {
///         Some(n) if n >= 0.0 => Ok(()),
///         _ => Err(format!("{name} must not be negative")),
///     });
///
/// assert_eq!(count.field_type(), FieldType::Number);
/// assert!(count.has_validator());
/// ```
#[derive(Clone)]
#[must_use]
pub struct FieldSchema {
    field_type: FieldType,
    required: bool,
    default: Option<Value>,
    example: Option<Value>,
    description: Option<LocalizedText>,
    validator: Option<FieldValidator>,
    formatter: Option<FieldFormatter>,
}

impl FieldSchema {
    /// Creates an optional field of the given type.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            example: None,
            description: None,
            validator: None,
            formatter: None,
        }
    }

    /// Creates an optional string field.
    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    /// Creates an optional number field.
    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    /// Creates an optional boolean field.
    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    /// Creates an optional object field.
    pub fn object() -> Self {
        Self::new(FieldType::Object)
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets whether the field is required.
    pub fn set_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the value used when the field is absent.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets an example value, shown in documentation.
    pub fn example(mut self, value: impl Into<Value>) -> Self {
        self.example = Some(value.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<LocalizedText>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attaches a synchronous validator.
    pub fn validator<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value, &str) -> Result<(), String> + Send + Sync + 'static,
    {
        let validator: FieldValidator = Arc::new(
            move |value: &Value, name: &str| -> BoxFuture<'static, Result<(), String>> {
                let outcome = check(value, name);
                Box::pin(std::future::ready(outcome))
            },
        );
        self.validator = Some(validator);
        self
    }

    /// Attaches an asynchronous validator.
    pub fn validator_async<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let validator: FieldValidator = Arc::new(
            move |value: &Value, name: &str| -> BoxFuture<'static, Result<(), String>> {
                Box::pin(check(value.clone(), name.to_string()))
            },
        );
        self.validator = Some(validator);
        self
    }

    /// Attaches a synchronous formatter.
    pub fn formatter<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value, &str) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let formatter: FieldFormatter = Arc::new(
            move |value: &Value, name: &str| -> BoxFuture<'static, anyhow::Result<Value>> {
                let outcome = transform(value, name);
                Box::pin(std::future::ready(outcome))
            },
        );
        self.formatter = Some(formatter);
        self
    }

    /// Attaches an asynchronous formatter.
    pub fn formatter_async<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(Value, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let formatter: FieldFormatter = Arc::new(
            move |value: &Value, name: &str| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(transform(value.clone(), name.to_string()))
            },
        );
        self.formatter = Some(formatter);
        self
    }

    /// Returns the declared type.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns `true` if the field is required.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Returns the default value.
    #[must_use]
    pub const fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Returns the example value.
    #[must_use]
    pub const fn example_value(&self) -> Option<&Value> {
        self.example.as_ref()
    }

    /// Returns the description.
    #[must_use]
    pub const fn localized_description(&self) -> Option<&LocalizedText> {
        self.description.as_ref()
    }

    /// Returns the validator, if any.
    #[must_use]
    pub fn validator_fn(&self) -> Option<&FieldValidator> {
        self.validator.as_ref()
    }

    /// Returns the formatter, if any.
    #[must_use]
    pub fn formatter_fn(&self) -> Option<&FieldFormatter> {
        self.formatter.as_ref()
    }

    /// Returns `true` if a validator is attached.
    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Returns `true` if a formatter is attached.
    #[must_use]
    pub fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }
}

impl fmt::Debug for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSchema")
            .field("field_type", &self.field_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("example", &self.example)
            .field("description", &self.description)
            .field("validator", &self.validator.is_some())
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}
