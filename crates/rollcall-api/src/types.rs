//! Shared value types for the rollcall API

use rollcall_util::{SessionId, SubjectId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the caller is asking the engine to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CheckIn,
    CheckOut,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CheckIn => "check_in",
            Action::CheckOut => "check_out",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_in" | "check-in" | "in" => Ok(Action::CheckIn),
            "check_out" | "check-out" | "out" => Ok(Action::CheckOut),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// One check-in/check-out interval for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub subject_id: SubjectId,
    pub check_in: Timestamp,
    /// None while the subject is present
    pub check_out: Option<Timestamp>,
    /// Whole minutes between check-in and check-out, set with check-out
    pub estimated_duration: Option<i64>,
}

impl Session {
    /// A freshly opened session
    pub fn open(subject_id: SubjectId, check_in: Timestamp) -> Self {
        Self {
            id: SessionId::new(),
            subject_id,
            check_in,
            check_out: None,
            estimated_duration: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }
}

/// Derived per-subject state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Presence {
    /// No open session
    Absent,
    /// Exactly one open session
    Present { session: Session },
}

impl Presence {
    pub fn from_open_session(open: Option<Session>) -> Self {
        match open {
            Some(session) => Presence::Present { session },
            None => Presence::Absent,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Presence::Present { .. })
    }
}

/// Capture modality, persisted by the UI as a preference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerMode {
    /// 2D optical code from a live camera feed
    #[default]
    Optical,
    /// Keyboard-wedge barcode scanner
    Wedge,
    /// Human picks a subject from a list
    Manual,
}

impl ScannerMode {
    /// Mode that follows this one in the UI toggle order
    pub fn next(self) -> Self {
        match self {
            ScannerMode::Optical => ScannerMode::Wedge,
            ScannerMode::Wedge => ScannerMode::Manual,
            ScannerMode::Manual => ScannerMode::Optical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerMode::Optical => "optical",
            ScannerMode::Wedge => "wedge",
            ScannerMode::Manual => "manual",
        }
    }
}

impl fmt::Display for ScannerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScannerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optical" | "qr" => Ok(ScannerMode::Optical),
            "wedge" | "barcode" => Ok(ScannerMode::Wedge),
            "manual" | "student" => Ok(ScannerMode::Manual),
            other => Err(format!("unknown scanner mode '{}'", other)),
        }
    }
}

/// Canonical output of the identity resolver, regardless of modality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub subject_id: SubjectId,
    /// Only manual selection may carry an explicit time
    pub explicit_time: Option<Timestamp>,
    pub mode: ScannerMode,
}
