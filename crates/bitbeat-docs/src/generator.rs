//! Projection of action metadata into documentation entries.

use bitbeat_config::BitbeatConfig;
use bitbeat_core::{ActionDefinition, ActionRegistry, FieldSchema, LocalizedText, Schema};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{DocsError, DocsResult};

/// Builds the `name → version → entry` documentation mapping.
#[derive(Debug, Clone)]
pub struct DocumentationGenerator {
    actions: Vec<ActionDefinition>,
    config: BitbeatConfig,
    overrides: IndexMap<(String, u32), Map<String, Value>>,
}

impl DocumentationGenerator {
    /// Creates a generator with no actions.
    #[must_use]
    pub fn new(config: BitbeatConfig) -> Self {
        Self {
            actions: Vec::new(),
            config,
            overrides: IndexMap::new(),
        }
    }

    /// Creates a generator over every action in `registry`.
    #[must_use]
    pub fn from_registry(registry: &ActionRegistry, config: BitbeatConfig) -> Self {
        let mut generator = Self::new(config);
        generator.actions = registry.definitions().cloned().collect();
        generator
    }

    /// Adds an action definition unless its `(name, version)` is already
    /// described.
    #[must_use]
    pub fn with_action(mut self, definition: ActionDefinition) -> Self {
        if !self.describes(definition.name(), definition.version()) {
            self.actions.push(definition);
        }
        self
    }

    /// Registers an override for one action version.
    ///
    /// The override's top-level keys replace the generated entry's keys.
    pub fn with_override(
        mut self,
        name: impl Into<String>,
        version: u32,
        value: Value,
    ) -> DocsResult<Self> {
        let name = name.into();
        let Value::Object(map) = value else {
            return Err(DocsError::InvalidOverride { name, version });
        };
        self.overrides
            .entry((name, version))
            .or_default()
            .extend(map);
        Ok(self)
    }

    /// Returns `true` if `(name, version)` is among the described actions.
    #[must_use]
    pub fn describes(&self, name: &str, version: u32) -> bool {
        self.actions
            .iter()
            .any(|a| a.name() == name && a.version() == version)
    }

    /// Generates documentation for every described action version.
    ///
    /// Descriptions resolve to `language`, then `fallback`.
    #[must_use]
    pub fn generate(&self, language: &str, fallback: &str) -> Value {
        let mut docs = Map::new();
        for definition in &self.actions {
            let versions = docs
                .entry(definition.name().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(versions) = versions {
                versions.insert(
                    definition.version().to_string(),
                    self.entry(definition, language, fallback),
                );
            }
        }
        debug!(
            actions = self.actions.len(),
            language, fallback, "generated documentation"
        );
        Value::Object(docs)
    }

    /// Generates the entry for one action version.
    #[must_use]
    pub fn entry(&self, definition: &ActionDefinition, language: &str, fallback: &str) -> Value {
        let path = self
            .config
            .action_path(definition.name(), definition.version());
        let methods: Vec<&str> = definition.methods().iter().map(http::Method::as_str).collect();

        let mut entry = json!({
            "name": definition.name(),
            "version": definition.version(),
            "methods": methods,
            "description": resolve(definition.description(), language, fallback),
            "deprecated": definition.is_deprecated(),
            "url": {
                "internal": self.config.internal_url(&path),
                "external": self.config.external_url(&path),
            },
            "path": path,
            "inputs": project(definition.inputs(), language, fallback),
            "outputs": project(definition.outputs(), language, fallback),
        });

        if let (Some(overrides), Value::Object(fields)) = (
            self.overrides
                .get(&(definition.name().to_string(), definition.version())),
            &mut entry,
        ) {
            for (key, value) in overrides {
                fields.insert(key.clone(), value.clone());
            }
        }
        entry
    }
}

fn resolve(text: Option<&LocalizedText>, language: &str, fallback: &str) -> Value {
    text.and_then(|t| t.resolve(language, fallback))
        .map_or(Value::Null, |t| Value::String(t.to_string()))
}

fn project(schema: &Schema, language: &str, fallback: &str) -> Value {
    let fields: Map<String, Value> = schema
        .iter()
        .map(|(name, field)| (name.clone(), project_field(field, language, fallback)))
        .collect();
    Value::Object(fields)
}

fn project_field(field: &FieldSchema, language: &str, fallback: &str) -> Value {
    json!({
        "type": field.field_type().as_str(),
        "required": field.is_required(),
        "default": field.default().cloned().unwrap_or(Value::Null),
        "example": field.example_value().cloned().unwrap_or(Value::Null),
        "description": resolve(field.localized_description(), language, fallback),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbeat_core::FnAction;
    use http::Method;

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry
            .register(FnAction::from_sync(
                ActionDefinition::builder("status")
                    .methods([Method::GET])
                    .description(LocalizedText::from("Server status").with("de", "Serverstatus"))
                    .build(),
                |_| Ok(None),
            ))
            .unwrap();
        registry
            .register(FnAction::from_sync(
                ActionDefinition::builder("version")
                    .methods([Method::GET])
                    .description(LocalizedText::from("Application version"))
                    .output(
                        "version",
                        FieldSchema::string()
                            .required()
                            .example("0.0.1")
                            .description("Semantic version"),
                    )
                    .build(),
                |_| Ok(None),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_enumerates_exactly_registered_actions() {
        let docs =
            DocumentationGenerator::from_registry(&registry(), BitbeatConfig::default())
                .generate("en", "en");

        let names: Vec<_> = docs.as_object().unwrap().keys().cloned().collect();
        assert_eq!(names, ["status", "version"]);
        assert_eq!(docs["status"].as_object().unwrap().len(), 1);
        assert_eq!(docs["version"].as_object().unwrap().len(), 1);
        assert_eq!(docs["status"]["1"]["description"], "Server status");
        assert_eq!(docs["version"]["1"]["description"], "Application version");
    }

    #[test]
    fn test_language_and_fallback() {
        let generator =
            DocumentationGenerator::from_registry(&registry(), BitbeatConfig::default());

        let german = generator.generate("de", "en");
        assert_eq!(german["status"]["1"]["description"], "Serverstatus");
        assert_eq!(german["version"]["1"]["description"], "Application version");

        let french = generator.generate("fr", "en");
        assert_eq!(french["status"]["1"]["description"], "Server status");

        let missing = generator.generate("fr", "it");
        assert_eq!(missing["status"]["1"]["description"], Value::Null);
    }

    #[test]
    fn test_entry_shape() {
        let mut config = BitbeatConfig::default();
        config.server.external_addresses = vec!["api.example.com".to_string()];
        let docs = DocumentationGenerator::from_registry(&registry(), config).generate("en", "en");
        let entry = &docs["version"]["1"];

        assert_eq!(entry["path"], "/api/v1/version");
        assert_eq!(entry["methods"], json!(["GET"]));
        assert_eq!(entry["deprecated"], false);
        assert_eq!(
            entry["url"]["internal"],
            "http://localhost:8080/api/v1/version"
        );
        assert_eq!(
            entry["url"]["external"],
            "http://api.example.com:8080/api/v1/version"
        );
        assert_eq!(
            entry["outputs"]["version"],
            json!({
                "type": "string",
                "required": true,
                "default": null,
                "example": "0.0.1",
                "description": "Semantic version"
            })
        );
        assert_eq!(entry["inputs"], json!({}));
    }

    #[test]
    fn test_validator_and_formatter_not_projected() {
        let definition = ActionDefinition::builder("guarded")
            .input(
                "code",
                FieldSchema::string()
                    .validator(|_, _| Ok(()))
                    .formatter(|v, _| Ok(v.clone())),
            )
            .build();
        let generator = DocumentationGenerator::new(BitbeatConfig::default()).with_action(definition);
        let code = &generator.generate("en", "en")["guarded"]["1"]["inputs"]["code"];

        let mut keys: Vec<_> = code.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["default", "description", "example", "required", "type"]);
    }

    #[test]
    fn test_override_wins() {
        let generator = DocumentationGenerator::from_registry(&registry(), BitbeatConfig::default())
            .with_override("status", 1, json!({"deprecated": true, "owner": "platform"}))
            .unwrap();
        let docs = generator.generate("en", "en");

        assert_eq!(docs["status"]["1"]["deprecated"], true);
        assert_eq!(docs["status"]["1"]["owner"], "platform");
        assert_eq!(docs["version"]["1"]["deprecated"], false);
    }

    #[test]
    fn test_override_must_be_object() {
        let result = DocumentationGenerator::new(BitbeatConfig::default())
            .with_override("status", 1, json!("nope"));
        assert!(matches!(result, Err(DocsError::InvalidOverride { .. })));
    }

    #[test]
    fn test_header_versioning_paths() {
        let mut config = BitbeatConfig::default();
        config.actions.header_versioning = true;
        let docs = DocumentationGenerator::from_registry(&registry(), config).generate("en", "en");
        assert_eq!(docs["status"]["1"]["path"], "/api/status");
    }

    #[test]
    fn test_with_action_skips_duplicates() {
        let generator = DocumentationGenerator::from_registry(&registry(), BitbeatConfig::default())
            .with_action(ActionDefinition::builder("status").build());
        assert_eq!(generator.generate("en", "en")["status"]["1"]["description"], "Server status");
    }
}
