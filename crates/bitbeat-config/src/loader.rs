//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;

use crate::{BitbeatConfig, ConfigError};

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values or a preset
/// 2. Configuration files and strings (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use bitbeat_config::ConfigLoader;
///
/// # fn main() -> Result<(), bitbeat_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_production()
///     .with_file("bitbeat.toml")?
///     .with_dotenv()
///     .with_env_prefix("BITBEAT")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: BitbeatConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: BitbeatConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with development preset configuration.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = BitbeatConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = BitbeatConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format follows the extension, `.toml` or `.json`. The file
    /// replaces the current configuration; sections it omits take their
    /// defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &extension)?;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `"toml"` or `"json"` format.
    ///
    /// ```
    /// use bitbeat_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = 3000", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 3000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `BITBEAT__SERVER__PORT=9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file into the process environment.
    ///
    /// A missing `.env` file is not an error.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Apply environment overrides and validate.
    pub fn load(mut self) -> Result<BitbeatConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> BitbeatConfig {
        self.config
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HOST"] => config.server.host = value.to_string(),
            ["SERVER", "PORT"] => config.server.port = parse_number(key, value)?,
            ["SERVER", "SECURE"] => config.server.secure = parse_flag(key, value)?,
            ["SERVER", "EXTERNAL_ADDRESSES"] => {
                config.server.external_addresses = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                config.server.max_body_bytes = parse_number(key, value)?;
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }

            ["ACTIONS", "PATH"] => config.actions.path = value.to_string(),
            ["ACTIONS", "VERSIONING"] => config.actions.versioning = parse_flag(key, value)?,
            ["ACTIONS", "HEADER_VERSIONING"] => {
                config.actions.header_versioning = parse_flag(key, value)?;
            }
            ["ACTIONS", "EXPOSE_INTERNAL_ERRORS"] => {
                config.actions.expose_internal_errors = parse_flag(key, value)?;
            }
            ["ACTIONS", "DOCUMENTATION"] => {
                config.actions.documentation = parse_flag(key, value)?;
            }

            ["CONNECTIONS", "KEEP_ALIVE_SECS"] => {
                config.connections.keep_alive_secs = parse_number(key, value)?;
            }

            ["LOGGING", "ENABLED"] => config.logging.enabled = parse_flag(key, value)?,
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "JSON"] => config.logging.json = parse_flag(key, value)?,
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = parse_flag(key, value)?;
            }

            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<BitbeatConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::unsupported_format(other)),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected non-negative integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_loader_presets() {
        let dev = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(dev.logging.level, "debug");

        let prod = ConfigLoader::new().with_production().load().unwrap();
        assert!(prod.logging.json);
    }

    #[test]
    fn test_loader_with_string_toml() {
        let toml = r#"
            [server]
            port = 3000
            external_addresses = ["api.example.com"]

            [actions]
            header_versioning = true
        "#;

        let config = ConfigLoader::new()
            .with_string(toml, "toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.actions.header_versioning);
        assert_eq!(config.action_path("status", 1), "/api/status");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"connections": {"keep_alive_secs": 5}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "JSON")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.connections.keep_alive_secs, 5);
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let result = ConfigLoader::new().with_string("[server]\nbogus = 1", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        let result = ConfigLoader::new().with_string("port: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[actions]\npath = \"svc\"").unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.action_path("status", 1), "/svc/v1/status");
    }

    #[test]
    fn test_loader_missing_file() {
        let result = ConfigLoader::new().with_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

        let loader = ConfigLoader::new()
            .with_optional_file("/definitely/not/here.toml")
            .unwrap();
        assert_eq!(loader.load_unvalidated(), BitbeatConfig::default());
    }

    #[test]
    fn test_loader_validates() {
        let result = ConfigLoader::new()
            .with_string("[server]\nport = 0", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_apply_env_var() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("BITBEAT__SERVER__PORT", "9000", "BITBEAT")
            .unwrap();
        loader
            .apply_env_var("BITBEAT__ACTIONS__HEADER_VERSIONING", "yes", "BITBEAT")
            .unwrap();
        loader
            .apply_env_var(
                "BITBEAT__SERVER__EXTERNAL_ADDRESSES",
                "a.example.com, b.example.com",
                "BITBEAT",
            )
            .unwrap();
        loader
            .apply_env_var("BITBEAT__CONNECTIONS__KEEP_ALIVE_SECS", "0", "BITBEAT")
            .unwrap();
        loader
            .apply_env_var("BITBEAT__UNKNOWN__KEY", "ignored", "BITBEAT")
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.server.port, 9000);
        assert!(config.actions.header_versioning);
        assert_eq!(
            config.server.external_addresses,
            ["a.example.com", "b.example.com"]
        );
        assert_eq!(config.connections.keep_alive(), None);
    }

    #[test]
    fn test_apply_env_var_parse_errors() {
        let mut loader = ConfigLoader::new();
        assert!(matches!(
            loader.apply_env_var("BITBEAT__SERVER__PORT", "eighty", "BITBEAT"),
            Err(ConfigError::EnvParseError { .. })
        ));
        assert!(matches!(
            loader.apply_env_var("BITBEAT__LOGGING__JSON", "maybe", "BITBEAT"),
            Err(ConfigError::EnvParseError { .. })
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("invalid"), None);
    }
}
