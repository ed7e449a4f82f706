//! Default paths for rollcall components
//!
//! Paths are user-writable by default (no root required):
//! - Config: `$XDG_CONFIG_HOME/rollcall/config.toml` or `~/.config/rollcall/config.toml`
//! - Data: `$XDG_DATA_HOME/rollcall` or `~/.local/share/rollcall`

use std::path::PathBuf;

/// Environment variable for overriding the data directory
pub const ROLLCALL_DATA_DIR_ENV: &str = "ROLLCALL_DATA_DIR";

/// Environment variable for overriding the config file path
pub const ROLLCALL_CONFIG_ENV: &str = "ROLLCALL_CONFIG";

/// Application subdirectory name
const APP_DIR: &str = "rollcall";

/// Database filename within the data directory
const DATABASE_FILENAME: &str = "rollcall.db";

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$ROLLCALL_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/rollcall` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/rollcall` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(ROLLCALL_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the ROLLCALL_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$ROLLCALL_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/rollcall/config.toml`
/// 3. `~/.config/rollcall/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ROLLCALL_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}

/// Path of the session database inside a data directory
pub fn database_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join(DATABASE_FILENAME)
}
