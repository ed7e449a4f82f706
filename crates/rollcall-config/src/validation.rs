//! Configuration validation

use crate::schema::{RawAttendanceConfig, RawConfig, RawScannerConfig, RawServiceConfig};
use rollcall_api::ScannerMode;
use thiserror::Error;

/// Largest accepted clock-skew correction, in hours
pub const MAX_ADVANCE_OFFSET_HOURS: i64 = 23;

/// Longest accepted minimum session, one day
pub const MAX_MIN_SESSION_MINUTES: i64 = 24 * 60;

/// Longest accepted per-subject lock wait
pub const MAX_LOCK_TIMEOUT_MS: u64 = 60_000;

/// Longest accepted wedge quiet period; slower than this is human typing
pub const MAX_WEDGE_QUIET_PERIOD_MS: u64 = 1_000;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field}: {message}")]
    FieldError {
        section: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("Unknown scanner mode '{0}' (expected optical, wedge or manual)")]
    UnknownScannerMode(String),
}

impl ValidationError {
    fn field(section: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        Self::FieldError {
            section,
            field,
            message: message.into(),
        }
    }
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_service(&config.service));
    errors.extend(validate_attendance(&config.attendance));
    errors.extend(validate_scanner(&config.scanner));

    errors
}

fn validate_service(service: &RawServiceConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(level) = &service.log_level
        && level.trim().is_empty()
    {
        errors.push(ValidationError::field(
            "service",
            "log_level",
            "cannot be empty",
        ));
    }

    if let Some(dir) = &service.data_dir
        && dir.as_os_str().is_empty()
    {
        errors.push(ValidationError::field(
            "service",
            "data_dir",
            "cannot be empty",
        ));
    }

    errors
}

fn validate_attendance(attendance: &RawAttendanceConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(hours) = attendance.advance_offset_hours
        && hours.abs() > MAX_ADVANCE_OFFSET_HOURS
    {
        errors.push(ValidationError::field(
            "attendance",
            "advance_offset_hours",
            format!(
                "{} is outside -{}..={}",
                hours, MAX_ADVANCE_OFFSET_HOURS, MAX_ADVANCE_OFFSET_HOURS
            ),
        ));
    }

    // Zero would allow a check-out at the check-in instant
    if let Some(minutes) = attendance.min_session_minutes
        && !(1..=MAX_MIN_SESSION_MINUTES).contains(&minutes)
    {
        errors.push(ValidationError::field(
            "attendance",
            "min_session_minutes",
            format!("{} is outside 1..={}", minutes, MAX_MIN_SESSION_MINUTES),
        ));
    }

    if let Some(ms) = attendance.lock_timeout_ms
        && !(1..=MAX_LOCK_TIMEOUT_MS).contains(&ms)
    {
        errors.push(ValidationError::field(
            "attendance",
            "lock_timeout_ms",
            format!("{} is outside 1..={}", ms, MAX_LOCK_TIMEOUT_MS),
        ));
    }

    errors
}

fn validate_scanner(scanner: &RawScannerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(mode) = &scanner.mode
        && mode.parse::<ScannerMode>().is_err()
    {
        errors.push(ValidationError::UnknownScannerMode(mode.clone()));
    }

    if let Some(ms) = scanner.wedge_quiet_period_ms
        && !(1..=MAX_WEDGE_QUIET_PERIOD_MS).contains(&ms)
    {
        errors.push(ValidationError::field(
            "scanner",
            "wedge_quiet_period_ms",
            format!("{} is outside 1..={}", ms, MAX_WEDGE_QUIET_PERIOD_MS),
        ));
    }

    if let Some(prefix) = &scanner.wedge_escape_prefix {
        if prefix.is_empty() {
            errors.push(ValidationError::field(
                "scanner",
                "wedge_escape_prefix",
                "cannot be empty",
            ));
        } else if prefix.chars().any(|c| c.is_ascii_digit() || c.is_whitespace()) {
            errors.push(ValidationError::field(
                "scanner",
                "wedge_escape_prefix",
                "cannot contain digits or whitespace",
            ));
        }
    }

    if scanner.frame_interval_ms == Some(0) {
        errors.push(ValidationError::field(
            "scanner",
            "frame_interval_ms",
            "must be greater than zero",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_str: &str) -> RawConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = raw("config_version = 1");
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_offset_bounds() {
        let config = raw(
            r#"
            config_version = 1
            [attendance]
            advance_offset_hours = 24
        "#,
        );
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("advance_offset_hours"));

        let config = raw(
            r#"
            config_version = 1
            [attendance]
            advance_offset_hours = -23
        "#,
        );
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn test_zero_minimum_session_rejected() {
        let config = raw(
            r#"
            config_version = 1
            [attendance]
            min_session_minutes = 0
        "#,
        );
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.to_string().contains("min_session_minutes")));
    }

    #[test]
    fn test_collects_every_error() {
        let config = raw(
            r#"
            config_version = 1
            [attendance]
            lock_timeout_ms = 0
            [scanner]
            mode = "camera"
            wedge_quiet_period_ms = 5000
            wedge_escape_prefix = "Alt 1"
            frame_interval_ms = 0
        "#,
        );
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 5);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::UnknownScannerMode(m) if m == "camera"))
        );
    }

    #[test]
    fn test_legacy_mode_names_accepted() {
        let config = raw(
            r#"
            config_version = 1
            [scanner]
            mode = "barcode"
        "#,
        );
        assert!(validate_config(&config).is_empty());
    }
}
