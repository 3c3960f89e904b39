//! The action registry.
//!
//! Servers receive their actions explicitly through an [`ActionRegistry`];
//! there is no global lookup. Registration order is preserved and
//! `(name, version)` pairs are unique.

use crate::action::{Action, ActionDefinition};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised when registering an action.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An action with the same name and version is already registered.
    #[error("action '{name}' version {version} is already registered")]
    Duplicate {
        /// Action name.
        name: String,
        /// Action version.
        version: u32,
    },

    /// The version is zero.
    #[error("action '{name}' must have a positive version")]
    InvalidVersion {
        /// Action name.
        name: String,
    },

    /// The name is empty or contains a path separator.
    #[error("invalid action name '{name}'")]
    InvalidName {
        /// Action name.
        name: String,
    },
}

/// Ordered set of actions keyed by `(name, version)`.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: IndexMap<(String, u32), Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an action.
    pub fn register(&mut self, action: impl Action) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(action))
    }

    /// Registers a shared action.
    pub fn register_arc(&mut self, action: Arc<dyn Action>) -> Result<(), RegistryError> {
        let definition = action.definition();
        let name = definition.name();
        if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidName {
                name: name.to_string(),
            });
        }
        if definition.version() == 0 {
            return Err(RegistryError::InvalidVersion {
                name: name.to_string(),
            });
        }

        let key = (name.to_string(), definition.version());
        if self.actions.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                name: key.0,
                version: key.1,
            });
        }
        self.actions.insert(key, action);
        Ok(())
    }

    /// Looks up an action by name and version.
    #[must_use]
    pub fn get(&self, name: &str, version: u32) -> Option<&Arc<dyn Action>> {
        self.actions.get(&(name.to_string(), version))
    }

    /// Returns the registered versions of `name`, in registration order.
    #[must_use]
    pub fn versions(&self, name: &str) -> Vec<u32> {
        self.actions
            .keys()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Iterates over all actions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Action>> {
        self.actions.values()
    }

    /// Iterates over all action definitions in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.values().map(|a| a.definition())
    }

    /// Returns the number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FnAction;

    fn action(name: &str, version: u32) -> FnAction {
        FnAction::from_sync(
            ActionDefinition::builder(name).version(version).build(),
            |_| Ok(None),
        )
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ActionRegistry::new();
        registry.register(action("status", 1)).unwrap();
        registry.register(action("status", 2)).unwrap();
        registry.register(action("version", 1)).unwrap();

        assert_eq!(registry.len(), 3);
        assert!(registry.get("status", 2).is_some());
        assert!(registry.get("status", 3).is_none());
        assert_eq!(registry.versions("status"), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ActionRegistry::new();
        registry.register(action("status", 1)).unwrap();
        let err = registry.register(action("status", 1)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                name: "status".into(),
                version: 1
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_zero_version_rejected() {
        let mut registry = ActionRegistry::new();
        assert!(matches!(
            registry.register(action("status", 0)),
            Err(RegistryError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut registry = ActionRegistry::new();
        for name in ["", "a/b", "a b"] {
            assert!(matches!(
                registry.register(action(name, 1)),
                Err(RegistryError::InvalidName { .. })
            ));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_definitions_keep_registration_order() {
        let mut registry = ActionRegistry::new();
        registry.register(action("zeta", 1)).unwrap();
        registry.register(action("alpha", 1)).unwrap();
        let names: Vec<_> = registry.definitions().map(ActionDefinition::name).collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }
}
