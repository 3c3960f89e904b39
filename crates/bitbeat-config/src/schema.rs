//! Configuration sections.

use std::time::Duration;

use bitbeat_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether the server is reached over TLS (terminated in front of it).
    #[serde(default)]
    pub secure: bool,

    /// Addresses the server is advertised under, first one preferred.
    #[serde(default)]
    pub external_addresses: Vec<String>,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// How long shutdown waits for in-flight requests.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            external_addresses: Vec::new(),
            request_timeout_ms: default_request_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ServerSection {
    /// Returns `host:port`, bracketing IPv6 hosts.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns `https` when secure, else `http`.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }
}

/// Action routing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ActionsSection {
    /// Base path all action routes live under.
    #[serde(default = "default_actions_path")]
    pub path: String,

    /// Whether action versions are exposed at all.
    #[serde(default = "default_true")]
    pub versioning: bool,

    /// Select versions by the `accept-version` header instead of a path
    /// segment.
    #[serde(default)]
    pub header_versioning: bool,

    /// Send server-processing error messages to clients verbatim.
    #[serde(default)]
    pub expose_internal_errors: bool,

    /// Register the `documentation` action.
    #[serde(default = "default_true")]
    pub documentation: bool,
}

fn default_actions_path() -> String {
    "api".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ActionsSection {
    fn default() -> Self {
        Self {
            path: default_actions_path(),
            versioning: true,
            header_versioning: false,
            expose_internal_errors: false,
            documentation: true,
        }
    }
}

/// Connection tracking settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionsSection {
    /// Idle seconds before a connection is recycled. `0` disables recycling.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    60
}

impl Default for ConnectionsSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl ConnectionsSection {
    /// Returns the keep-alive window, `None` when recycling is disabled.
    #[must_use]
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON lines instead of pretty output.
    #[serde(default)]
    pub json: bool,

    /// Include file and line of each log site.
    #[serde(default)]
    pub include_location: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            json: false,
            include_location: false,
        }
    }
}

impl LoggingSection {
    /// Converts to the telemetry crate's [`LogConfig`].
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.json,
            include_location: self.include_location,
            ..LogConfig::default()
        }
    }
}
