//! Error types for documentation generation.

use bitbeat_core::RegistryError;
use thiserror::Error;

/// Errors that can occur while setting up documentation.
#[derive(Debug, Error)]
pub enum DocsError {
    /// A documentation override is not a JSON object.
    #[error("Documentation override for '{name}' version {version} must be an object")]
    InvalidOverride {
        /// Action name.
        name: String,
        /// Action version.
        version: u32,
    },

    /// The documentation action could not be registered.
    #[error("Failed to register documentation action: {0}")]
    Registry(#[from] RegistryError),
}

/// Result type for documentation operations.
pub type DocsResult<T> = Result<T, DocsError>;
