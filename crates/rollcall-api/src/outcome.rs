//! Outcome of an attendance request

use rollcall_util::{SessionId, SubjectId, Timestamp, format_timestamp};
use serde::{Deserialize, Serialize};

use crate::{Action, Session};

/// Structured reason codes for why a transition was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ReasonCode {
    /// The subject is not known to the store
    UnknownSubject,
    /// Check-in while a session is already open
    AlreadyCheckedIn {
        open_session: SessionId,
        since: Timestamp,
    },
    /// Check-out with no open session
    NotCheckedIn,
    /// Check-out inside the minimum session duration
    TooSoon {
        check_in: Timestamp,
        earliest_check_out: Timestamp,
        minimum_minutes: i64,
    },
    /// The requested instant or interval intersects an existing session
    Overlap {
        start: Timestamp,
        end: Option<Timestamp>,
    },
}

impl ReasonCode {
    /// Stable machine-checkable name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::UnknownSubject => "unknown_subject",
            ReasonCode::AlreadyCheckedIn { .. } => "already_checked_in",
            ReasonCode::NotCheckedIn => "not_checked_in",
            ReasonCode::TooSoon { .. } => "too_soon",
            ReasonCode::Overlap { .. } => "overlap",
        }
    }

    /// Human-readable explanation
    pub fn describe(&self) -> String {
        match self {
            ReasonCode::UnknownSubject => "subject not found; no session was recorded".into(),
            ReasonCode::AlreadyCheckedIn { since, .. } => format!(
                "already checked in since {}; check out first",
                format_timestamp(since)
            ),
            ReasonCode::NotCheckedIn => "no open session to check out of".into(),
            ReasonCode::TooSoon {
                earliest_check_out,
                minimum_minutes,
                ..
            } => format!(
                "sessions must last at least {} minutes; check out again at or after {}",
                minimum_minutes,
                format_timestamp(earliest_check_out)
            ),
            ReasonCode::Overlap { start, end } => match end {
                Some(end) => format!(
                    "interval {} - {} overlaps an existing session",
                    format_timestamp(start),
                    format_timestamp(end)
                ),
                None => format!(
                    "{} falls inside an existing session",
                    format_timestamp(start)
                ),
            },
        }
    }
}

/// A refused transition with enough context to render a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub code: ReasonCode,
    pub subject_id: SubjectId,
    pub action: Action,
    pub effective_time: Timestamp,
    pub message: String,
}

impl Rejection {
    pub fn new(
        code: ReasonCode,
        subject_id: SubjectId,
        action: Action,
        effective_time: Timestamp,
    ) -> Self {
        let message = format!("{} for {} rejected: {}", action, subject_id, code.describe());
        Self {
            code,
            subject_id,
            action,
            effective_time,
            message,
        }
    }
}

/// Category of persistence failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Storage unreachable or erroring
    Unavailable,
    /// A concurrent writer changed the subject's state
    Conflict,
    /// The per-subject lock could not be acquired in time
    Contention,
}

/// Transient failure; the identical request may be resubmitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceFailure {
    pub kind: FailureKind,
    pub subject_id: SubjectId,
    pub action: Action,
    pub effective_time: Timestamp,
    pub message: String,
    pub retryable: bool,
}

impl PersistenceFailure {
    pub fn new(
        kind: FailureKind,
        subject_id: SubjectId,
        action: Action,
        effective_time: Timestamp,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            subject_id,
            action,
            effective_time,
            message: message.into(),
            retryable: true,
        }
    }
}

/// Which edge of the state machine was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Absent -> Present
    CheckedIn,
    /// Present -> Absent
    CheckedOut,
}

/// Discriminated result of `record_attendance`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttendanceResult {
    Recorded {
        transition: Transition,
        session: Session,
    },
    Rejected(Rejection),
    Failed(PersistenceFailure),
}

impl AttendanceResult {
    pub fn is_recorded(&self) -> bool {
        matches!(self, AttendanceResult::Recorded { .. })
    }

    /// Session snapshot, when a transition was committed
    pub fn session(&self) -> Option<&Session> {
        match self {
            AttendanceResult::Recorded { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Rejection code, when the request was refused
    pub fn reason_code(&self) -> Option<&ReasonCode> {
        match self {
            AttendanceResult::Rejected(rejection) => Some(&rejection.code),
            _ => None,
        }
    }

    /// One-line summary for logs and terminals
    pub fn summary(&self) -> String {
        match self {
            AttendanceResult::Recorded {
                transition: Transition::CheckedIn,
                session,
            } => format!(
                "{} checked in at {}",
                session.subject_id,
                format_timestamp(&session.check_in)
            ),
            AttendanceResult::Recorded {
                transition: Transition::CheckedOut,
                session,
            } => format!(
                "{} checked out after {} minutes",
                session.subject_id,
                session.estimated_duration.unwrap_or_default()
            ),
            AttendanceResult::Rejected(rejection) => rejection.message.clone(),
            AttendanceResult::Failed(failure) => {
                format!("{} (retryable)", failure.message)
            }
        }
    }
}
