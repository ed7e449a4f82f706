//! Configuration parsing and validation for rollcall
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service, attendance and scanner sections, all optional
//! - Validation that reports every problem at once

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use rollcall_util::default_config_path;
use std::path::{Path, PathBuf};
use thiserror::Error;

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
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Resolve the configuration for a process.
///
/// An explicit path must exist. Without one, the default location is used
/// when present and built-in defaults otherwise. Returns the file the policy
/// was read from, if any.
pub fn load_or_default(explicit: Option<&Path>) -> ConfigResult<(Policy, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((load_config(path)?, Some(path.to_path_buf())));
    }

    let path = default_config_path();
    if path.exists() {
        let policy = load_config(&path)?;
        return Ok((policy, Some(path)));
    }

    tracing::debug!(path = %path.display(), "No config file, using defaults");
    Ok((Policy::default(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_api::ScannerMode;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let policy = parse_config("config_version = 1").unwrap();
        assert_eq!(policy.attendance.min_session_minutes, 10);
        assert_eq!(policy.scanner.mode, ScannerMode::Optical);
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [attendance]
            min_session_minutes = 10
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let config = r#"
            config_version = 1

            [attendance]
            min_session_minutes = -1
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { errors }) if errors.len() == 1));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "config_version = 1\n[scanner]\nmode = \"wedge\"").unwrap();

        let (policy, source) = load_or_default(Some(file.path())).unwrap();
        assert_eq!(policy.scanner.mode, ScannerMode::Wedge);
        assert_eq!(source.as_deref(), Some(file.path()));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_or_default(Some(&missing)),
            Err(ConfigError::ReadError(_))
        ));
    }
}
