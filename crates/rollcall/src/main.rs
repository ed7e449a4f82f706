//! rollcall - attendance tracking from the command line
//!
//! This is the main entry point for rollcall.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Session engine
//! - Identity capture (wedge scanner or manual entry on stdin)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_api::{Action, AttendanceResult, Presence, ResolvedIdentity, ScannerMode};
use rollcall_capture::{IdentityResolver, RawCaptureEvent, ResolutionError, WedgeKey};
use rollcall_config::{Policy, load_or_default};
use rollcall_core::SessionEngine;
use rollcall_store::{AuditEvent, AuditEventType, SessionStore, SqliteStore};
use rollcall_util::{
    RollcallError, SubjectId, Timestamp, database_path, format_minutes, format_timestamp,
    is_mock_time_active, parse_timestamp,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// rollcall - Attendance check-in and check-out
#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Attendance check-in and check-out", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, env = "ROLLCALL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (default: from config)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enroll a subject, or update its display name
    Enroll {
        subject: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// Check a subject in
    CheckIn {
        subject: String,
        /// Backdate to this time (RFC 3339 or "YYYY-MM-DD HH:MM", UTC)
        #[arg(long)]
        at: Option<String>,
    },

    /// Check a subject out
    CheckOut {
        subject: String,
        /// Backdate to this time (RFC 3339 or "YYYY-MM-DD HH:MM", UTC)
        #[arg(long)]
        at: Option<String>,
    },

    /// Read identities from stdin until EOF or a signal
    Scan {
        /// check-in or check-out
        #[arg(long)]
        action: Action,
        /// Override the configured scanner mode
        #[arg(long)]
        mode: Option<ScannerMode>,
    },

    /// Show whether a subject is present, with recent sessions
    Status {
        subject: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Print recent audit events as JSON lines
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Wired-up components shared by every command
struct App {
    policy: Policy,
    store: Arc<SqliteStore>,
    engine: SessionEngine,
}

impl App {
    fn new(policy: Policy, data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(&data_dir);
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        debug!(db_path = %db_path.display(), "Store initialized");

        let engine = SessionEngine::new(store.clone(), policy.attendance);

        Ok(Self {
            policy,
            store,
            engine,
        })
    }

    async fn run(self, command: Command) -> Result<ExitCode> {
        match command {
            Command::Enroll { subject, name } => self.enroll(&subject, name.as_deref()),
            Command::CheckIn { subject, at } => self.record(&subject, Action::CheckIn, at),
            Command::CheckOut { subject, at } => self.record(&subject, Action::CheckOut, at),
            Command::Scan { action, mode } => self.scan(action, mode).await,
            Command::Status { subject, limit } => self.status(&subject, limit),
            Command::Audit { limit } => self.audit(limit),
        }
    }

    fn enroll(&self, subject: &str, name: Option<&str>) -> Result<ExitCode> {
        let subject_id = subject_id(subject)?;
        let created = self.store.register_subject(&subject_id, name)?;

        if created {
            println!("Enrolled {}", subject_id);
        } else {
            println!("Updated {}", subject_id);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn record(&self, subject: &str, action: Action, at: Option<String>) -> Result<ExitCode> {
        let subject_id = subject_id(subject)?;
        let nominal = at.as_deref().map(parse_at).transpose()?;

        let result = self.engine.record_attendance(&subject_id, action, nominal);
        println!("{}", result.summary());

        Ok(exit_code(&result))
    }

    fn status(&self, subject: &str, limit: usize) -> Result<ExitCode> {
        let subject_id = subject_id(subject)?;
        if !self.store.subject_exists(&subject_id)? {
            return Err(RollcallError::SubjectNotFound(subject_id).into());
        }

        match self.engine.presence(&subject_id)? {
            Presence::Present { session } => println!(
                "{} is present since {}",
                subject_id,
                format_timestamp(&session.check_in)
            ),
            Presence::Absent => println!("{} is absent", subject_id),
        }

        for session in self.store.sessions_for_subject(&subject_id, limit)? {
            let check_out = session
                .check_out
                .map(|t| format_timestamp(&t))
                .unwrap_or_else(|| "open".to_string());
            let duration = session
                .estimated_duration
                .map(format_minutes)
                .unwrap_or_default();
            println!(
                "  {}  {} -> {}  {}",
                session.id,
                format_timestamp(&session.check_in),
                check_out,
                duration
            );
        }

        Ok(ExitCode::SUCCESS)
    }

    fn audit(&self, limit: usize) -> Result<ExitCode> {
        for event in self.store.get_recent_audits(limit)? {
            println!("{}", serde_json::to_string(&event)?);
        }
        Ok(ExitCode::SUCCESS)
    }

    async fn scan(&self, action: Action, mode: Option<ScannerMode>) -> Result<ExitCode> {
        let mut resolver = IdentityResolver::new(self.policy.scanner.clone())?;
        if let Some(mode) = mode {
            resolver.set_mode(mode);
        }

        if resolver.mode() == ScannerMode::Optical {
            return Err(RollcallError::capture(
                "no camera backend is available here, use --mode wedge or --mode manual",
            )
            .into());
        }

        self.store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let (key_tx, key_rx) = mpsc::channel(256);
        let (id_tx, mut id_rx) = mpsc::channel(16);

        let listener = match resolver.mode() {
            ScannerMode::Wedge => Some(resolver.spawn_wedge_listener(key_rx, id_tx.clone())),
            _ => None,
        };
        let mut key_tx = Some(key_tx);
        let mut id_tx = Some(id_tx);

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stats = ScanStats::default();

        info!(mode = %resolver.mode(), action = %action, "Scanning");

        loop {
            tokio::select! {
                biased;

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // Resolved identities before more input
                resolved = id_rx.recv() => {
                    let Some(resolved) = resolved else { break };
                    self.handle_identity(resolved, action, &mut stats);
                }

                line = lines.next_line(), if key_tx.is_some() => {
                    match line.context("Failed to read stdin")? {
                        Some(line) => {
                            feed_line(&resolver, &line, key_tx.as_ref(), id_tx.as_ref()).await;
                        }
                        None => {
                            debug!("Input closed, draining");
                            key_tx = None;
                            id_tx = None;
                        }
                    }
                }
            }
        }

        if let Some(listener) = listener {
            listener.abort();
        }

        info!(
            recorded = stats.recorded,
            rejected = stats.rejected,
            failed = stats.failed,
            unresolved = stats.unresolved,
            "Scan finished"
        );

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log scan shutdown");
        }

        Ok(if stats.failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    fn handle_identity(
        &self,
        resolved: Result<ResolvedIdentity, ResolutionError>,
        action: Action,
        stats: &mut ScanStats,
    ) {
        let identity = match resolved {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Could not resolve identity");
                println!("Unreadable scan: {}", e);
                stats.unresolved += 1;
                return;
            }
        };

        let result =
            self.engine
                .record_attendance(&identity.subject_id, action, identity.explicit_time);
        println!("{}", result.summary());

        match result {
            AttendanceResult::Recorded { .. } => stats.recorded += 1,
            AttendanceResult::Rejected(_) => stats.rejected += 1,
            AttendanceResult::Failed(_) => stats.failed += 1,
        }
    }
}

#[derive(Debug, Default)]
struct ScanStats {
    recorded: usize,
    rejected: usize,
    failed: usize,
    unresolved: usize,
}

/// Forward one line of stdin to the active capture path.
///
/// Wedge mode replays the line as keystrokes ending in Enter. Manual mode
/// reads `SUBJECT [TIME]`.
async fn feed_line(
    resolver: &IdentityResolver,
    line: &str,
    keys: Option<&mpsc::Sender<WedgeKey>>,
    ids: Option<&mpsc::Sender<Result<ResolvedIdentity, ResolutionError>>>,
) {
    match resolver.mode() {
        ScannerMode::Wedge => {
            let Some(keys) = keys else { return };
            for key in line.chars().map(WedgeKey::Char).chain([WedgeKey::Enter]) {
                if keys.send(key).await.is_err() {
                    warn!("Wedge listener stopped");
                    return;
                }
            }
        }
        _ => {
            let Some(ids) = ids else { return };
            let (subject, rest) = line
                .trim()
                .split_once(char::is_whitespace)
                .unwrap_or((line.trim(), ""));

            let explicit_time = if rest.trim().is_empty() {
                None
            } else {
                match parse_at(rest) {
                    Ok(t) => Some(t),
                    Err(e) => {
                        println!("{}", e);
                        return;
                    }
                }
            };

            let resolved = resolver.resolve(RawCaptureEvent::ManualSelection {
                subject_id: subject.to_string(),
                explicit_time,
            });
            let _ = ids.send(resolved).await;
        }
    }
}

fn subject_id(raw: &str) -> rollcall_util::Result<SubjectId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RollcallError::validation("subject id must not be empty"));
    }
    Ok(SubjectId::new(trimmed))
}

fn parse_at(raw: &str) -> rollcall_util::Result<Timestamp> {
    parse_timestamp(raw)
        .ok_or_else(|| RollcallError::validation(format!("unrecognized time '{}'", raw.trim())))
}

fn exit_code(result: &AttendanceResult) -> ExitCode {
    if result.is_recorded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let (policy, source) =
        load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize logging
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| policy.service.log_level.clone());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "rollcall starting");
    if is_mock_time_active() {
        warn!("Mock time is active, timestamps are not wall-clock time");
    }

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| policy.service.data_dir.clone());

    let app = App::new(policy, data_dir)?;

    let source = source.map(|p| p.display().to_string());
    let attendance = *app.engine.policy();
    info!(
        config = source.as_deref().unwrap_or("defaults"),
        advance_offset = %attendance.advance_offset,
        "Configuration loaded"
    );
    if let Err(e) = app.store.append_audit(AuditEvent::new(AuditEventType::ConfigLoaded {
        source,
        advance_offset_hours: attendance.advance_offset.as_hours(),
        min_session_minutes: attendance.min_session_minutes,
    })) {
        warn!(error = %e, "Failed to log configuration");
    }

    app.run(args.command).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_backdated_check_in() {
        let args = Args::parse_from(["rollcall", "check-in", "S1", "--at", "2025-09-01 08:00"]);
        match args.command {
            Command::CheckIn { subject, at } => {
                assert_eq!(subject, "S1");
                assert!(parse_at(at.as_deref().unwrap()).is_ok());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn args_parse_scan_mode() {
        let args = Args::parse_from(["rollcall", "scan", "--action", "out", "--mode", "barcode"]);
        match args.command {
            Command::Scan { action, mode } => {
                assert_eq!(action, Action::CheckOut);
                assert_eq!(mode, Some(ScannerMode::Wedge));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn blank_subject_rejected() {
        assert!(matches!(
            subject_id("  "),
            Err(RollcallError::ValidationError(_))
        ));
        assert_eq!(subject_id(" S1 ").unwrap().as_str(), "S1");
    }

    #[test]
    fn unparseable_time_rejected() {
        assert!(parse_at("yesterday").is_err());
    }
}
