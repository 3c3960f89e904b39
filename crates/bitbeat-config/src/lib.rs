//! Typed configuration for bitbeat.
//!
//! [`BitbeatConfig`] carries every setting a bitbeat server reads:
//!
//! - [`ServerSection`] - bind host and port, secure flag, advertised
//!   external addresses, timeouts and body limit
//! - [`ActionsSection`] - actions base path and versioning scheme
//! - [`ConnectionsSection`] - keep-alive window for idle connections
//! - [`LoggingSection`] - log level and output format
//!
//! Unknown fields are rejected when parsing, so typos surface at startup.
//!
//! # Example
//!
//! ```no_run
//! use bitbeat_config::ConfigLoader;
//!
//! # fn main() -> Result<(), bitbeat_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("bitbeat.toml")?
//!     .with_env_prefix("BITBEAT")
//!     .load()?;
//!
//! println!("actions under {}", config.action_path("status", 1));
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! secure = false
//! external_addresses = ["api.example.com"]
//!
//! [actions]
//! path = "api"
//! versioning = true
//! header_versioning = false
//!
//! [connections]
//! keep_alive_secs = 60
//!
//! [logging]
//! level = "info"
//! json = true
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with variables named `PREFIX__SECTION__KEY`,
//! for example `BITBEAT__SERVER__PORT=9000` or
//! `BITBEAT__ACTIONS__HEADER_VERSIONING=true`.

#![doc(html_root_url = "https://docs.rs/bitbeat-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::BitbeatConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{ActionsSection, ConnectionsSection, LoggingSection, ServerSection};
