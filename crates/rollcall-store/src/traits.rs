//! Store trait definitions

use rollcall_api::Session;
use rollcall_util::{SessionId, SubjectId, TimeRange, Timestamp};

use crate::{AuditEvent, StoreResult};

/// Persistence collaborator consumed by the session engine.
///
/// Callers serialize access per subject; implementations only need each
/// individual call to be atomic.
pub trait SessionStore: Send + Sync {
    // Subjects

    /// Whether the subject is known
    fn subject_exists(&self, subject_id: &SubjectId) -> StoreResult<bool>;

    // Sessions

    /// The subject's open session, if any
    fn find_open_session(&self, subject_id: &SubjectId) -> StoreResult<Option<Session>>;

    /// First session of the subject intersecting `range`.
    ///
    /// Open sessions are treated as ending at `open_until`. `exclude` skips
    /// one session, used when probing the interval being closed.
    fn find_overlapping(
        &self,
        subject_id: &SubjectId,
        range: TimeRange,
        open_until: Timestamp,
        exclude: Option<SessionId>,
    ) -> StoreResult<Option<Session>>;

    /// Insert a freshly opened session
    fn insert_session(&self, session: &Session) -> StoreResult<()>;

    /// Close an open session.
    ///
    /// Fails with `StoreError::Conflict` when the session is already closed.
    fn update_session_checkout(
        &self,
        session_id: &SessionId,
        check_out: Timestamp,
        duration_minutes: i64,
    ) -> StoreResult<()>;

    /// Most recent sessions of a subject, newest check-in first
    fn sessions_for_subject(&self, subject_id: &SubjectId, limit: usize)
    -> StoreResult<Vec<Session>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
