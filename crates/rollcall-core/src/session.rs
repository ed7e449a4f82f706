//! Attendance transition rules
//!
//! Pure decisions over a subject's open session. History-wide overlap checks
//! need the store and live in the engine.

use rollcall_api::{ReasonCode, Session};
use rollcall_util::{SubjectId, TimeRange, Timestamp, whole_minutes_between};

/// Absent -> Present: allowed only while no session is open
pub fn open_session(
    subject_id: &SubjectId,
    open: Option<&Session>,
    at: Timestamp,
) -> Result<Session, ReasonCode> {
    if let Some(open) = open {
        return Err(ReasonCode::AlreadyCheckedIn {
            open_session: open.id,
            since: open.check_in,
        });
    }

    Ok(Session::open(subject_id.clone(), at))
}

/// Present -> Absent: allowed only once the minimum duration has elapsed.
///
/// Returns the closed snapshot; the stored row is untouched.
pub fn close_session(
    open: Option<Session>,
    at: Timestamp,
    min_session_minutes: i64,
) -> Result<Session, ReasonCode> {
    let Some(mut session) = open else {
        return Err(ReasonCode::NotCheckedIn);
    };

    let minimum = chrono::Duration::minutes(min_session_minutes);
    if at.signed_duration_since(session.check_in) < minimum {
        return Err(ReasonCode::TooSoon {
            check_in: session.check_in,
            earliest_check_out: session.check_in + minimum,
            minimum_minutes: min_session_minutes,
        });
    }

    session.check_out = Some(at);
    session.estimated_duration = Some(whole_minutes_between(session.check_in, at));
    Ok(session)
}

/// Interval a session occupies, for overlap probes.
///
/// An open session probes only its check-in instant.
pub fn occupied_range(session: &Session) -> TimeRange {
    match session.check_out {
        Some(check_out) => TimeRange::between(session.check_in, check_out),
        None => TimeRange::at(session.check_in),
    }
}
