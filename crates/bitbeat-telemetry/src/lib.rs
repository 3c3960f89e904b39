//! Structured logging for bitbeat.
//!
//! bitbeat logs through [`tracing`]. This crate installs the global
//! subscriber: JSON lines for production, pretty multi-line output for
//! development, both filtered by an [`EnvFilter`](tracing_subscriber::EnvFilter)
//! directive such as `info` or `bitbeat_server=debug,info`.
//!
//! # Example
//!
//! ```rust,ignore
//! use bitbeat_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(action = "status", version = 1, "route bound");
//! ```
//!
//! Field names shared by every bitbeat crate live in [`fields`].

#![doc(html_root_url = "https://docs.rs/bitbeat-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
