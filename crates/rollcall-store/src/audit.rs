//! Audit event types

use rollcall_api::Action;
use rollcall_util::{SessionId, SubjectId, Timestamp};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Long-running capture loop started
    ServiceStarted,

    /// Long-running capture loop stopped
    ServiceStopped,

    /// Configuration loaded
    ConfigLoaded {
        source: Option<String>,
        advance_offset_hours: i8,
        min_session_minutes: i64,
    },

    /// Subject enrolled or renamed
    SubjectRegistered {
        subject_id: SubjectId,
        display_name: Option<String>,
    },

    /// Absent -> Present committed
    CheckedIn {
        session_id: SessionId,
        subject_id: SubjectId,
        check_in: Timestamp,
    },

    /// Present -> Absent committed
    CheckedOut {
        session_id: SessionId,
        subject_id: SubjectId,
        check_out: Timestamp,
        duration_minutes: i64,
    },

    /// A request was refused without mutating state
    TransitionRejected {
        subject_id: SubjectId,
        action: Action,
        effective_time: Timestamp,
        code: String,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Wall-clock time the event was recorded
    pub timestamp: Timestamp,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: rollcall_util::now(),
            event,
        }
    }
}
