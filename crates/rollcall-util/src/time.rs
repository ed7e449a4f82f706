//! Time utilities for rollcall
//!
//! Every decision the session engine makes is taken on an *effective* time:
//! the nominal time (either "now" or a caller-supplied instant) shifted by a
//! fixed advance offset. The shift is done by [`effective_time`], which is
//! pure and total.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ROLLCALL_MOCK_TIME` environment variable can be set
//! to override the system time returned by [`now`]. The mock time advances
//! at the same rate as real time.
//!
//! Format: `YYYY-MM-DD HH:MM:SS`, interpreted as UTC (e.g., `2025-09-01 07:55:00`)
//!
//! Example:
//! ```bash
//! ROLLCALL_MOCK_TIME="2025-09-01 07:55:00" rollcall check-in 42
//! ```

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Timestamp type used across the workspace
pub type Timestamp = DateTime<Utc>;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ROLLCALL_MOCK_TIME";

/// Format accepted by the mock time variable and by [`parse_timestamp`]
pub const NAIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default advance offset applied to nominal timestamps, in hours
pub const DEFAULT_ADVANCE_OFFSET_HOURS: i8 = 3;

/// Cached offset between mock time and real time at process start.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Utc::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, NAIVE_TIMESTAMP_FORMAT) {
                    Ok(naive_dt) => {
                        let mock_dt = Utc.from_utc_datetime(&naive_dt);
                        let offset = mock_dt.signed_duration_since(Utc::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = NAIVE_TIMESTAMP_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> Timestamp {
    let real_now = Utc::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Fixed clock-skew correction between the capture environment and the
/// facility's local time, in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceOffset(i8);

impl AdvanceOffset {
    pub const fn hours(hours: i8) -> Self {
        Self(hours)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn as_hours(&self) -> i8 {
        self.0
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.0))
    }
}

impl Default for AdvanceOffset {
    fn default() -> Self {
        Self(DEFAULT_ADVANCE_OFFSET_HOURS)
    }
}

impl fmt::Display for AdvanceOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}h", self.0)
    }
}

/// Compute the effective timestamp the session engine reasons about.
///
/// Saturates at the representable bounds instead of failing, so every
/// input maps to exactly one output.
pub fn effective_time(nominal: Timestamp, offset: AdvanceOffset) -> Timestamp {
    let delta = offset.as_chrono();
    nominal.checked_add_signed(delta).unwrap_or(if delta < chrono::Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Whole minutes elapsed from `start` to `end`, rounded down.
///
/// Negative spans round toward negative infinity so that a span one second
/// short of a minute never counts as that minute.
pub fn whole_minutes_between(start: Timestamp, end: Timestamp) -> i64 {
    let secs = end.signed_duration_since(start).num_seconds();
    secs.div_euclid(60)
}

/// Half-open interval used for overlap probes.
///
/// `end == None` probes a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// A probe for a single instant
    pub fn at(instant: Timestamp) -> Self {
        Self {
            start: instant,
            end: None,
        }
    }

    /// A probe for `[start, end)`
    pub fn between(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Whether this probe intersects the stored interval `[other_start, other_end)`.
    pub fn overlaps(&self, other_start: Timestamp, other_end: Timestamp) -> bool {
        match self.end {
            None => other_start <= self.start && self.start < other_end,
            Some(end) => other_start < end && self.start < other_end,
        }
    }
}

/// Render a timestamp the way it is persisted (RFC 3339, UTC, microseconds).
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a user-supplied timestamp.
///
/// Accepts RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` interpreted as UTC.
pub fn parse_timestamp(input: &str) -> Option<Timestamp> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    [NAIVE_TIMESTAMP_FORMAT, "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format a minute count for display ("45m", "2h 5m", "1d 3h 0m").
pub fn format_minutes(minutes: i64) -> String {
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let days = minutes / 1440;
    let hours = (minutes % 1440) / 60;
    let mins = minutes % 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, mins)
    } else {
        format!("{}h {}m", hours, mins)
    }
}
