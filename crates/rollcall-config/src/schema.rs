//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Session engine rules
    #[serde(default)]
    pub attendance: RawAttendanceConfig,

    /// Identity capture settings
    #[serde(default)]
    pub scanner: RawScannerConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the session database
    pub data_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    pub log_level: Option<String>,
}

/// Session engine rules
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAttendanceConfig {
    /// Hours added to every nominal timestamp (default 3)
    pub advance_offset_hours: Option<i64>,

    /// Minimum session length before check-out is accepted (default 10)
    pub min_session_minutes: Option<i64>,

    /// How long to wait for another request on the same subject (default 2000)
    pub lock_timeout_ms: Option<u64>,
}

/// Identity capture settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawScannerConfig {
    /// Initial mode: "optical", "wedge" or "manual"
    pub mode: Option<String>,

    /// Keystroke gap that resets the wedge buffer (default 50)
    pub wedge_quiet_period_ms: Option<u64>,

    /// Escape prefix used by the scanner for literal character codes (default "Alt")
    pub wedge_escape_prefix: Option<String>,

    /// Sampling interval of the optical scan loop (default 100)
    pub frame_interval_ms: Option<u64>,
}
