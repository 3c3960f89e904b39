//! Main configuration type.

use serde::{Deserialize, Serialize};

use crate::{ActionsSection, ConfigError, ConnectionsSection, LoggingSection, ServerSection};

/// Complete bitbeat server configuration.
///
/// # Example
///
/// ```
/// use bitbeat_config::BitbeatConfig;
///
/// let config = BitbeatConfig::default();
/// assert_eq!(config.server.port, 8080);
/// assert_eq!(config.action_path("status", 2), "/api/v2/status");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct BitbeatConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerSection,

    /// Action routing configuration.
    #[serde(default)]
    pub actions: ActionsSection,

    /// Connection tracking configuration.
    #[serde(default)]
    pub connections: ConnectionsSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl BitbeatConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid_value("server.port", "must be non-zero"));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be non-zero",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be non-zero",
            ));
        }
        if self.actions.path.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid_value(
                "actions.path",
                format!("must not contain whitespace: {:?}", self.actions.path),
            ));
        }
        if self.logging.enabled && self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }
        Ok(())
    }

    /// Development preset: pretty debug logs with source locations and
    /// internal error messages exposed to clients.
    ///
    /// ```
    /// use bitbeat_config::BitbeatConfig;
    ///
    /// let config = BitbeatConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.json = false;
        config.logging.include_location = true;
        config.actions.expose_internal_errors = true;
        config
    }

    /// Production preset: JSON logs at info level, internal errors hidden.
    ///
    /// ```
    /// use bitbeat_config::BitbeatConfig;
    ///
    /// let config = BitbeatConfig::production();
    /// assert!(config.logging.json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.json = true;
        config.logging.include_location = false;
        config.actions.expose_internal_errors = false;
        config
    }

    /// Computes the route path of one action version.
    ///
    /// The path is the actions base path, then `v{version}` when versioning
    /// is on and carried in the path, then the action name.
    ///
    /// ```
    /// use bitbeat_config::BitbeatConfig;
    ///
    /// let mut config = BitbeatConfig::default();
    /// assert_eq!(config.action_path("status", 2), "/api/v2/status");
    ///
    /// config.actions.header_versioning = true;
    /// assert_eq!(config.action_path("status", 2), "/api/status");
    /// ```
    #[must_use]
    pub fn action_path(&self, name: &str, version: u32) -> String {
        let mut segments: Vec<String> = self
            .actions
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if self.actions.versioning && !self.actions.header_versioning {
            segments.push(format!("v{version}"));
        }
        segments.push(name.to_string());
        format!("/{}", segments.join("/"))
    }

    /// Returns the route's version matcher, present only under header-based
    /// versioning.
    #[must_use]
    pub fn version_matcher(&self, version: u32) -> Option<String> {
        (self.actions.versioning && self.actions.header_versioning)
            .then(|| format!("{version}.0.0"))
    }

    /// URL of `path` on the bind address.
    ///
    /// An unspecified bind host is reported as `localhost`.
    #[must_use]
    pub fn internal_url(&self, path: &str) -> String {
        let host = match self.server.host.as_str() {
            "" | "0.0.0.0" | "::" | "[::]" => "localhost".to_string(),
            h if h.contains(':') && !h.starts_with('[') => format!("[{h}]"),
            h => h.to_string(),
        };
        format!(
            "{}://{}:{}{}",
            self.server.scheme(),
            host,
            self.server.port,
            path
        )
    }

    /// URL of `path` on the first advertised external address, falling back
    /// to [`internal_url`](Self::internal_url).
    ///
    /// An address with a scheme is used as is. A bare host gets the
    /// configured port unless it names its own.
    #[must_use]
    pub fn external_url(&self, path: &str) -> String {
        match self.server.external_addresses.first() {
            Some(address) if address.contains("://") => {
                format!("{}{}", address.trim_end_matches('/'), path)
            }
            Some(address) => {
                let address = address.trim_end_matches('/');
                let authority = if has_port(address) {
                    address.to_string()
                } else if address.contains(':') && !address.starts_with('[') {
                    format!("[{address}]:{}", self.server.port)
                } else {
                    format!("{address}:{}", self.server.port)
                };
                format!("{}://{}{}", self.server.scheme(), authority, path)
            }
            None => self.internal_url(path),
        }
    }
}

/// Returns `true` if `address` ends in an explicit `:port`.
fn has_port(address: &str) -> bool {
    let host_end = address.rfind(']').map_or(0, |i| i + 1);
    let rest = &address[host_end..];
    match rest.rsplit_once(':') {
        // more than one colon without brackets is a bare IPv6 address
        Some((host, port)) if host_end > 0 || !host.contains(':') => {
            !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config() {
        let config = BitbeatConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.actions.path, "api");
        assert!(config.actions.versioning);
        assert!(!config.actions.header_versioning);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_path_versioning() {
        let config = BitbeatConfig::default();
        assert_eq!(config.action_path("status", 2), "/api/v2/status");
        assert_eq!(config.version_matcher(2), None);
    }

    #[test]
    fn test_header_versioning() {
        let mut config = BitbeatConfig::default();
        config.actions.header_versioning = true;
        assert_eq!(config.action_path("status", 1), "/api/status");
        assert_eq!(config.version_matcher(1).as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_versioning_disabled() {
        let mut config = BitbeatConfig::default();
        config.actions.versioning = false;
        config.actions.header_versioning = true;
        assert_eq!(config.action_path("status", 3), "/api/status");
        assert_eq!(config.version_matcher(3), None);
    }

    #[test]
    fn test_base_path_slashes_normalized() {
        let mut config = BitbeatConfig::default();
        config.actions.path = "/svc//api/".to_string();
        assert_eq!(config.action_path("status", 1), "/svc/api/v1/status");

        config.actions.path = String::new();
        assert_eq!(config.action_path("status", 1), "/v1/status");
    }

    #[test]
    fn test_internal_url() {
        let config = BitbeatConfig::default();
        assert_eq!(
            config.internal_url("/api/v1/status"),
            "http://localhost:8080/api/v1/status"
        );

        let mut secure = BitbeatConfig::default();
        secure.server.secure = true;
        secure.server.host = "10.0.0.4".to_string();
        assert_eq!(secure.internal_url("/x"), "https://10.0.0.4:8080/x");
    }

    #[test]
    fn test_external_url() {
        let mut config = BitbeatConfig::default();
        assert_eq!(config.external_url("/x"), config.internal_url("/x"));

        config.server.external_addresses =
            vec!["api.example.com".to_string(), "other.example.com".to_string()];
        assert_eq!(config.external_url("/x"), "http://api.example.com:8080/x");

        config.server.external_addresses = vec!["203.0.113.5".to_string()];
        assert_eq!(
            config.external_url("/api/v1/status"),
            "http://203.0.113.5:8080/api/v1/status"
        );

        config.server.external_addresses = vec!["edge.example.com:443".to_string()];
        assert_eq!(config.external_url("/x"), "http://edge.example.com:443/x");

        config.server.external_addresses = vec!["2001:db8::1".to_string()];
        assert_eq!(config.external_url("/x"), "http://[2001:db8::1]:8080/x");

        config.server.external_addresses = vec!["[2001:db8::1]:9000".to_string()];
        assert_eq!(config.external_url("/x"), "http://[2001:db8::1]:9000/x");

        config.server.external_addresses = vec!["https://edge.example.com/".to_string()];
        assert_eq!(config.external_url("/x"), "https://edge.example.com/x");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = BitbeatConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = BitbeatConfig::default();
        config.server.max_body_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = BitbeatConfig::default();
        config.actions.path = "my api".to_string();
        assert!(config.validate().is_err());

        let mut config = BitbeatConfig::default();
        config.logging.level = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_presets() {
        let dev = BitbeatConfig::development();
        assert!(dev.actions.expose_internal_errors);
        assert!(dev.validate().is_ok());

        let prod = BitbeatConfig::production();
        assert!(prod.logging.json);
        assert!(!prod.actions.expose_internal_errors);
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BitbeatConfig::development();
        let text = toml::to_string(&config).unwrap();
        let parsed: BitbeatConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, parsed);
    }

    proptest! {
        #[test]
        fn action_path_is_well_formed(
            base in "[a-z/]{0,12}",
            name in "[a-z][a-z0-9_-]{0,10}",
            version in 1u32..1000,
            header in any::<bool>(),
        ) {
            let mut config = BitbeatConfig::default();
            config.actions.path = base;
            config.actions.header_versioning = header;
            let path = config.action_path(&name, version);

            prop_assert!(path.starts_with('/'));
            prop_assert!(!path.contains("//"));
            let suffix = format!("/{name}");
            prop_assert!(path.ends_with(&suffix));
            let segment = format!("/v{version}/");
            prop_assert_eq!(path.contains(&segment), !header);
        }
    }
}
