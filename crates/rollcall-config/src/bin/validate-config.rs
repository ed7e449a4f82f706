//! Config validation CLI tool
//!
//! Validates a rollcall configuration file and reports any errors.

use rollcall_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a rollcall configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rollcall_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", rollcall_config::CURRENT_CONFIG_VERSION);
            println!("  Data directory: {}", policy.service.data_dir.display());
            println!("  Log level: {}", policy.service.log_level);
            println!();
            println!("Attendance:");
            println!("  Advance offset: {}", policy.attendance.advance_offset);
            println!(
                "  Minimum session: {} minutes",
                policy.attendance.min_session_minutes
            );
            println!(
                "  Lock timeout: {} ms",
                policy.attendance.lock_timeout.as_millis()
            );
            println!();
            println!("Scanner:");
            println!("  Mode: {}", policy.scanner.mode);
            println!(
                "  Wedge quiet period: {} ms",
                policy.scanner.wedge_quiet_period.as_millis()
            );
            println!(
                "  Wedge escape prefix: {}",
                policy.scanner.wedge_escape_prefix
            );
            println!(
                "  Frame interval: {} ms",
                policy.scanner.frame_interval.as_millis()
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                rollcall_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                rollcall_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                rollcall_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                rollcall_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        rollcall_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
