//! Validated policy structures

use crate::schema::{RawAttendanceConfig, RawConfig, RawScannerConfig, RawServiceConfig};
use rollcall_api::ScannerMode;
use rollcall_util::{AdvanceOffset, DEFAULT_ADVANCE_OFFSET_HOURS, default_data_dir};
use std::path::PathBuf;
use std::time::Duration;

/// Default minimum session length in minutes
pub const DEFAULT_MIN_SESSION_MINUTES: i64 = 10;

/// Default per-subject lock wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Default wedge keystroke quiet period
pub const DEFAULT_WEDGE_QUIET_PERIOD: Duration = Duration::from_millis(50);

/// Default escape prefix for literal character codes
pub const DEFAULT_WEDGE_ESCAPE_PREFIX: &str = "Alt";

/// Default optical sampling interval
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Default log filter
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Validated policy ready for use by the engine and capture layer
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub service: ServiceConfig,
    pub attendance: AttendancePolicy,
    pub scanner: ScannerConfig,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            attendance: AttendancePolicy::from_raw(raw.attendance),
            scanner: ScannerConfig::from_raw(raw.scanner),
        }
    }
}

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_level: raw
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Rules the session engine enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendancePolicy {
    pub advance_offset: AdvanceOffset,
    /// Inclusive lower bound on session length, in whole minutes
    pub min_session_minutes: i64,
    pub lock_timeout: Duration,
}

impl AttendancePolicy {
    fn from_raw(raw: RawAttendanceConfig) -> Self {
        // Range already checked by validation
        let hours = raw
            .advance_offset_hours
            .and_then(|h| i8::try_from(h).ok())
            .unwrap_or(DEFAULT_ADVANCE_OFFSET_HOURS);

        Self {
            advance_offset: AdvanceOffset::hours(hours),
            min_session_minutes: raw
                .min_session_minutes
                .unwrap_or(DEFAULT_MIN_SESSION_MINUTES),
            lock_timeout: raw
                .lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_LOCK_TIMEOUT),
        }
    }

    /// Minimum session length as a chrono duration
    pub fn min_session(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.min_session_minutes)
    }
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            advance_offset: AdvanceOffset::default(),
            min_session_minutes: DEFAULT_MIN_SESSION_MINUTES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Identity capture configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub mode: ScannerMode,
    pub wedge_quiet_period: Duration,
    pub wedge_escape_prefix: String,
    pub frame_interval: Duration,
}

impl ScannerConfig {
    fn from_raw(raw: RawScannerConfig) -> Self {
        Self {
            mode: raw
                .mode
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
            wedge_quiet_period: raw
                .wedge_quiet_period_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_WEDGE_QUIET_PERIOD),
            wedge_escape_prefix: raw
                .wedge_escape_prefix
                .unwrap_or_else(|| DEFAULT_WEDGE_ESCAPE_PREFIX.to_string()),
            frame_interval: raw
                .frame_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_FRAME_INTERVAL),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            mode: ScannerMode::default(),
            wedge_quiet_period: DEFAULT_WEDGE_QUIET_PERIOD,
            wedge_escape_prefix: DEFAULT_WEDGE_ESCAPE_PREFIX.to_string(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let raw: RawConfig = toml::from_str("config_version = 1").unwrap();
        let policy = Policy::from_raw(raw);

        assert_eq!(policy.attendance, AttendancePolicy::default());
        assert_eq!(policy.attendance.advance_offset.as_hours(), 3);
        assert_eq!(policy.attendance.min_session(), chrono::Duration::minutes(10));
        assert_eq!(policy.scanner, ScannerConfig::default());
        assert_eq!(policy.scanner.wedge_quiet_period, Duration::from_millis(50));
        assert_eq!(policy.service.log_level, "info");
    }

    #[test]
    fn test_overrides_applied() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [service]
            data_dir = "/srv/rollcall"
            [attendance]
            advance_offset_hours = -5
            min_session_minutes = 1
            [scanner]
            mode = "student"
            frame_interval_ms = 40
        "#,
        )
        .unwrap();
        let policy = Policy::from_raw(raw);

        assert_eq!(policy.service.data_dir, PathBuf::from("/srv/rollcall"));
        assert_eq!(policy.attendance.advance_offset, AdvanceOffset::hours(-5));
        assert_eq!(policy.attendance.min_session_minutes, 1);
        assert_eq!(policy.attendance.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert_eq!(policy.scanner.mode, ScannerMode::Manual);
        assert_eq!(policy.scanner.frame_interval, Duration::from_millis(40));
    }
}
