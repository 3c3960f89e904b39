//! Server error types.

use bitbeat_config::ConfigError;
use bitbeat_core::RegistryError;
use bitbeat_docs::DocsError;
use bitbeat_telemetry::TelemetryError;
use thiserror::Error;

use crate::engine::EngineError;
use crate::lifecycle::LifecycleError;

/// Errors raised while preparing or running a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An action could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The documentation action could not be set up.
    #[error(transparent)]
    Docs(#[from] DocsError),

    /// A route could not be bound.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A lifecycle hook failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Logging could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
