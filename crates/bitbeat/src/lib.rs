//! # Bitbeat
//!
//! **Versioned, schema-validated HTTP actions**
//!
//! Bitbeat exposes named, versioned units of request logic ("actions") as
//! HTTP routes:
//!
//! - **Declared contracts** – every input and output field has a type,
//!   defaults, examples, validators and formatters
//! - **Versioning** – by path segment (`/api/v2/status`) or by the
//!   `accept-version` header
//! - **Connection tracking** – per-client connections with middleware hooks
//!   and idle recycling
//! - **Self-description** – a built-in `documentation` action derived from
//!   the same metadata
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bitbeat::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_env_prefix("BITBEAT").load()?;
//!
//!     WebServer::builder()
//!         .config(config)
//!         .action(StatusAction::new())
//!         .action(VersionAction::new(env!("CARGO_PKG_VERSION")))
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! connection → validation → format → execution → output shaping → response
//! ```

#![doc(html_root_url = "https://docs.rs/bitbeat/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod actions;

pub use actions::{StatusAction, VersionAction};

// Re-export core types
pub use bitbeat_core as core;

// Re-export pipeline types
pub use bitbeat_pipeline as pipeline;

// Re-export configuration types
pub use bitbeat_config as config;

// Re-export logging setup
pub use bitbeat_telemetry as telemetry;

// Re-export documentation types
pub use bitbeat_docs as docs;

// Re-export server types
pub use bitbeat_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use bitbeat::prelude::*;
///
/// let status = ActionDefinition::builder("status").strict(true).build();
/// assert_eq!(status.version(), 1);
/// ```
pub mod prelude {
    pub use crate::{StatusAction, VersionAction};

    pub use bitbeat_core::{
        Action, ActionDefinition, ActionError, ActionMiddleware, ActionRegistry, ActionResult,
        BoxFuture, FieldSchema, FieldType, FnAction, LocalizedText, RequestContext, RequestId,
    };

    pub use bitbeat_config::{BitbeatConfig, ConfigLoader};

    pub use bitbeat_docs::{DocumentationAction, DocumentationGenerator};

    pub use bitbeat_server::{
        Connection, ConnectionMiddleware, HookError, HookResult, Lifecycle, ShutdownSignal,
        WebServer,
    };
}
