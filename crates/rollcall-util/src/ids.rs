//! Strongly-typed identifiers for rollcall

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a tracked subject
///
/// Subjects are created elsewhere; the core only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for an attendance session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_id_equality() {
        let id1 = SubjectId::new("5edd4ef2");
        let id2 = SubjectId::from("5edd4ef2");
        let id3 = SubjectId::new("520c0268");

        assert_eq!(id1, id2);
        assert_ne!(id1, id3);
    }

    #[test]
    fn session_id_uniqueness() {
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        assert_ne!(s1, s2);
    }

    #[test]
    fn session_id_parse() {
        let s = SessionId::new();
        assert_eq!(SessionId::parse(&s.to_string()), Some(s));
        assert_eq!(SessionId::parse("not-a-uuid"), None);
    }

    #[test]
    fn ids_serialize_transparently() {
        let subject = SubjectId::new("S1");
        let json = serde_json::to_string(&subject).unwrap();
        assert_eq!(json, "\"S1\"");
        let parsed: SubjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(subject, parsed);

        let session_id = SessionId::new();
        let json = serde_json::to_string(&session_id).unwrap();
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(session_id, parsed);
    }
}
