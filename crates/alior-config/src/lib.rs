//! Configuration parsing and validation for aliord
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Session TTL and reaper interval
//! - Event status sweep interval
//! - Validation that reports every problem at once

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_config_or_default(path: impl AsRef<Path>) -> ConfigResult<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "No config file, using defaults");
        return Ok(Settings::default());
    }
    load_config(path)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Settings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Settings::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let settings = parse_config("config_version = 1").unwrap();
        assert_eq!(settings.sessions.ttl, Duration::from_secs(600));
        assert_eq!(settings.sessions.sweep_interval, Duration::from_secs(20));
        assert_eq!(settings.status.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            socket_path = "/tmp/alior-test/alior.sock"
            data_dir = "/tmp/alior-test/data"

            [sessions]
            ttl_seconds = 900
            sweep_interval_seconds = 30

            [status]
            sweep_interval_seconds = 120
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(
            settings.service.socket_path.to_string_lossy(),
            "/tmp/alior-test/alior.sock"
        );
        assert_eq!(settings.sessions.ttl, Duration::from_secs(900));
        assert_eq!(settings.sessions.sweep_interval, Duration::from_secs(30));
        assert_eq!(settings.status.sweep_interval, Duration::from_secs(120));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = r#"
            config_version = 1

            [sessions]
            ttl_seconds = 0
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_version = 1\n[sessions]\nttl_seconds = 60\n").unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(settings.sessions.ttl, Duration::from_secs(60));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_config_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.sessions.ttl, Settings::default().sessions.ttl);

        assert!(matches!(
            load_config(dir.path().join("absent.toml")),
            Err(ConfigError::ReadError(_))
        ));
    }
}
