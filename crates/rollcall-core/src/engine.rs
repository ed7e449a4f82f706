//! Session engine

use chrono::SubsecRound;
use rollcall_api::{
    Action, AttendanceResult, FailureKind, PersistenceFailure, Presence, ReasonCode, Rejection,
    Session, Transition,
};
use rollcall_config::AttendancePolicy;
use rollcall_store::{AuditEvent, AuditEventType, SessionStore, StoreError, StoreResult};
use rollcall_util::{SubjectId, TimeRange, Timestamp, effective_time, format_timestamp};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

use crate::{SubjectLocks, close_session, occupied_range, open_session};

/// Outcome of the decide step, before it is reported
type Verdict = Result<(Transition, Session), ReasonCode>;

/// The attendance state machine
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    policy: AttendancePolicy,
    locks: SubjectLocks,
}

impl SessionEngine {
    /// Create a new session engine
    pub fn new(store: Arc<dyn SessionStore>, policy: AttendancePolicy) -> Self {
        info!(
            advance_offset = %policy.advance_offset,
            min_session_minutes = policy.min_session_minutes,
            lock_timeout_ms = policy.lock_timeout.as_millis() as u64,
            "Session engine initialized"
        );

        Self {
            store,
            locks: SubjectLocks::new(policy.lock_timeout),
            policy,
        }
    }

    /// Get current policy
    pub fn policy(&self) -> &AttendancePolicy {
        &self.policy
    }

    /// Apply a check-in or check-out for a subject.
    ///
    /// `nominal` overrides "now" for backfilled entries. The advance offset is
    /// applied either way.
    pub fn record_attendance(
        &self,
        subject_id: &SubjectId,
        action: Action,
        nominal: Option<Timestamp>,
    ) -> AttendanceResult {
        self.record_attendance_at(subject_id, action, nominal, rollcall_util::now())
    }

    /// Same as [`record_attendance`](Self::record_attendance) with an explicit
    /// wall clock
    pub fn record_attendance_at(
        &self,
        subject_id: &SubjectId,
        action: Action,
        nominal: Option<Timestamp>,
        now: Timestamp,
    ) -> AttendanceResult {
        let offset = self.policy.advance_offset;
        // Microsecond precision, as persisted
        let effective = effective_time(nominal.unwrap_or(now), offset).trunc_subsecs(6);
        // Open sessions extend to the effective present
        let open_until = effective_time(now, offset).trunc_subsecs(6);

        let span = info_span!(
            "record_attendance",
            subject_id = %subject_id,
            action = %action,
            effective_time = %format_timestamp(&effective),
        );
        let _enter = span.enter();

        let _guard = match self.locks.acquire(subject_id) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "Subject busy");
                return AttendanceResult::Failed(PersistenceFailure::new(
                    FailureKind::Contention,
                    subject_id.clone(),
                    action,
                    effective,
                    e.to_string(),
                ));
            }
        };

        match self.decide_and_apply(subject_id, action, effective, open_until) {
            Ok(Ok((transition, session))) => {
                self.audit_recorded(transition, &session);
                AttendanceResult::Recorded {
                    transition,
                    session,
                }
            }
            Ok(Err(code)) => {
                info!(code = code.as_str(), "Transition rejected");
                self.audit(AuditEventType::TransitionRejected {
                    subject_id: subject_id.clone(),
                    action,
                    effective_time: effective,
                    code: code.as_str().to_string(),
                });
                AttendanceResult::Rejected(Rejection::new(
                    code,
                    subject_id.clone(),
                    action,
                    effective,
                ))
            }
            Err(e) => {
                warn!(error = %e, "Persistence failure");
                AttendanceResult::Failed(PersistenceFailure::new(
                    failure_kind(&e),
                    subject_id.clone(),
                    action,
                    effective,
                    e.to_string(),
                ))
            }
        }
    }

    /// Derived state of a subject
    pub fn presence(&self, subject_id: &SubjectId) -> StoreResult<Presence> {
        let open = self.store.find_open_session(subject_id)?;
        Ok(Presence::from_open_session(open))
    }

    fn decide_and_apply(
        &self,
        subject_id: &SubjectId,
        action: Action,
        effective: Timestamp,
        open_until: Timestamp,
    ) -> StoreResult<Verdict> {
        if !self.store.subject_exists(subject_id)? {
            return Ok(Err(ReasonCode::UnknownSubject));
        }

        let open = self.store.find_open_session(subject_id)?;

        match action {
            Action::CheckIn => {
                let session = match open_session(subject_id, open.as_ref(), effective) {
                    Ok(session) => session,
                    Err(code) => return Ok(Err(code)),
                };

                // The new session stays open until the effective present
                let probe = if effective < open_until {
                    TimeRange::between(effective, open_until)
                } else {
                    TimeRange::at(effective)
                };
                if let Some(existing) =
                    self.store
                        .find_overlapping(subject_id, probe, open_until, None)?
                {
                    debug!(conflicting_session = %existing.id, "Check-in overlaps history");
                    return Ok(Err(ReasonCode::Overlap {
                        start: probe.start,
                        end: probe.end,
                    }));
                }

                self.store.insert_session(&session)?;
                Ok(Ok((Transition::CheckedIn, session)))
            }
            Action::CheckOut => {
                let closed = match close_session(open, effective, self.policy.min_session_minutes)
                {
                    Ok(session) => session,
                    Err(code) => return Ok(Err(code)),
                };

                let range = occupied_range(&closed);
                if let Some(existing) =
                    self.store
                        .find_overlapping(subject_id, range, open_until, Some(closed.id))?
                {
                    debug!(conflicting_session = %existing.id, "Closing interval overlaps history");
                    return Ok(Err(ReasonCode::Overlap {
                        start: range.start,
                        end: range.end,
                    }));
                }

                self.store.update_session_checkout(
                    &closed.id,
                    effective,
                    closed.estimated_duration.unwrap_or_default(),
                )?;
                Ok(Ok((Transition::CheckedOut, closed)))
            }
        }
    }

    fn audit_recorded(&self, transition: Transition, session: &Session) {
        match transition {
            Transition::CheckedIn => {
                info!(session_id = %session.id, "Checked in");
                self.audit(AuditEventType::CheckedIn {
                    session_id: session.id,
                    subject_id: session.subject_id.clone(),
                    check_in: session.check_in,
                });
            }
            Transition::CheckedOut => {
                let duration_minutes = session.estimated_duration.unwrap_or_default();
                info!(session_id = %session.id, duration_minutes, "Checked out");
                self.audit(AuditEventType::CheckedOut {
                    session_id: session.id,
                    subject_id: session.subject_id.clone(),
                    check_out: session.check_out.unwrap_or(session.check_in),
                    duration_minutes,
                });
            }
        }
    }

    /// Audit failures never change an outcome
    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self.store.append_audit(AuditEvent::new(event)) {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

fn failure_kind(error: &StoreError) -> FailureKind {
    match error {
        StoreError::Conflict(_) => FailureKind::Conflict,
        _ => FailureKind::Unavailable,
    }
}
