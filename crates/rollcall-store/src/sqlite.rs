//! SQLite-based store implementation

use rollcall_api::Session;
use rollcall_util::{
    SessionId, SubjectId, TimeRange, Timestamp, format_timestamp, parse_timestamp,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, AuditEventType, SessionStore, StoreError, StoreResult};

/// How long SQLite waits on a locked database file before reporting busy
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SESSION_COLUMNS: &str = "id, subject_id, check_in, check_out, estimated_duration";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Enrolled subjects (read-only to the engine)
            CREATE TABLE IF NOT EXISTS subjects (
                id TEXT PRIMARY KEY,
                display_name TEXT,
                created_at TEXT NOT NULL
            );

            -- Attendance sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL REFERENCES subjects(id),
                check_in TEXT NOT NULL,
                check_out TEXT,
                estimated_duration INTEGER,
                CHECK (check_out IS NULL OR check_out > check_in)
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- At most one open session per subject
            CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
                ON sessions(subject_id) WHERE check_out IS NULL;

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_sessions_subject_check_in
                ON sessions(subject_id, check_in);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    /// Enroll a subject, or update its display name.
    ///
    /// Returns `true` when the subject was newly created.
    pub fn register_subject(
        &self,
        subject_id: &SubjectId,
        display_name: Option<&str>,
    ) -> StoreResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existed: bool = tx
            .query_row(
                "SELECT 1 FROM subjects WHERE id = ?",
                [subject_id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            r#"
            INSERT INTO subjects (id, display_name, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET display_name = COALESCE(excluded.display_name, display_name)
            "#,
            params![
                subject_id.as_str(),
                display_name,
                format_timestamp(&rollcall_util::now())
            ],
        )?;

        let event = AuditEvent::new(AuditEventType::SubjectRegistered {
            subject_id: subject_id.clone(),
            display_name: display_name.map(str::to_string),
        });
        insert_audit(&tx, &event)?;

        tx.commit()?;
        debug!(subject_id = %subject_id, created = !existed, "Subject registered");
        Ok(!existed)
    }
}

impl SessionStore for SqliteStore {
    fn subject_exists(&self, subject_id: &SubjectId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM subjects WHERE id = ?",
                [subject_id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn find_open_session(&self, subject_id: &SubjectId) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sessions WHERE subject_id = ? AND check_out IS NULL",
            SESSION_COLUMNS
        );

        let row = conn
            .query_row(&sql, [subject_id.as_str()], SessionRow::from_row)
            .optional()?;

        row.map(SessionRow::into_session).transpose()
    }

    fn find_overlapping(
        &self,
        subject_id: &SubjectId,
        range: TimeRange,
        open_until: Timestamp,
        exclude: Option<SessionId>,
    ) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        let exclude = exclude.map(|id| id.to_string());
        let open_until = format_timestamp(&open_until);
        let start = format_timestamp(&range.start);

        // Timestamps share one fixed-width format, so text order is time order
        let row = match range.end {
            None => {
                let sql = format!(
                    r#"
                    SELECT {} FROM sessions
                    WHERE subject_id = ?1
                      AND (?2 IS NULL OR id <> ?2)
                      AND check_in <= ?3
                      AND ?3 < COALESCE(check_out, ?4)
                    ORDER BY check_in
                    LIMIT 1
                    "#,
                    SESSION_COLUMNS
                );
                conn.query_row(
                    &sql,
                    params![subject_id.as_str(), exclude, start, open_until],
                    SessionRow::from_row,
                )
                .optional()?
            }
            Some(end) => {
                let sql = format!(
                    r#"
                    SELECT {} FROM sessions
                    WHERE subject_id = ?1
                      AND (?2 IS NULL OR id <> ?2)
                      AND check_in < ?3
                      AND ?4 < COALESCE(check_out, ?5)
                    ORDER BY check_in
                    LIMIT 1
                    "#,
                    SESSION_COLUMNS
                );
                conn.query_row(
                    &sql,
                    params![
                        subject_id.as_str(),
                        exclude,
                        format_timestamp(&end),
                        start,
                        open_until
                    ],
                    SessionRow::from_row,
                )
                .optional()?
            }
        };

        row.map(SessionRow::into_session).transpose()
    }

    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO sessions (id, subject_id, check_in, check_out, estimated_duration)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                session.id.to_string(),
                session.subject_id.as_str(),
                format_timestamp(&session.check_in),
                session.check_out.as_ref().map(format_timestamp),
                session.estimated_duration
            ],
        )?;

        tx.commit()?;
        debug!(session_id = %session.id, subject_id = %session.subject_id, "Session inserted");
        Ok(())
    }

    fn update_session_checkout(
        &self,
        session_id: &SessionId,
        check_out: Timestamp,
        duration_minutes: i64,
    ) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            r#"
            UPDATE sessions
            SET check_out = ?, estimated_duration = ?
            WHERE id = ? AND check_out IS NULL
            "#,
            params![
                format_timestamp(&check_out),
                duration_minutes,
                session_id.to_string()
            ],
        )?;

        if changed != 1 {
            // Dropping the transaction rolls back
            return Err(StoreError::Conflict(format!(
                "session {} is not open",
                session_id
            )));
        }

        tx.commit()?;
        debug!(session_id = %session_id, duration_minutes, "Session closed");
        Ok(())
    }

    fn sessions_for_subject(
        &self,
        subject_id: &SubjectId,
        limit: usize,
    ) -> StoreResult<Vec<Session>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM sessions WHERE subject_id = ? ORDER BY check_in DESC LIMIT ?",
            SESSION_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![subject_id.as_str(), limit], SessionRow::from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        event.id = insert_audit(&conn, &event)?;
        debug!(event_id = event.id, "Audit event appended");
        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = parse_stored_timestamp(&timestamp_str)?;
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

fn insert_audit(conn: &Connection, event: &AuditEvent) -> StoreResult<i64> {
    let event_json = serde_json::to_string(&event.event)?;
    conn.execute(
        "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
        params![format_timestamp(&event.timestamp), event_json],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_stored_timestamp(value: &str) -> StoreResult<Timestamp> {
    parse_timestamp(value)
        .ok_or_else(|| StoreError::Serialization(format!("invalid timestamp '{}'", value)))
}

/// Raw column values of a `sessions` row
struct SessionRow {
    id: String,
    subject_id: String,
    check_in: String,
    check_out: Option<String>,
    estimated_duration: Option<i64>,
}

impl SessionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            check_in: row.get(2)?,
            check_out: row.get(3)?,
            estimated_duration: row.get(4)?,
        })
    }

    fn into_session(self) -> StoreResult<Session> {
        let id = SessionId::parse(&self.id)
            .ok_or_else(|| StoreError::Serialization(format!("invalid session id '{}'", self.id)))?;

        Ok(Session {
            id,
            subject_id: SubjectId::new(self.subject_id),
            check_in: parse_stored_timestamp(&self.check_in)?,
            check_out: self
                .check_out
                .as_deref()
                .map(parse_stored_timestamp)
                .transpose()?,
            estimated_duration: self.estimated_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 9, 1, h, m, 0).unwrap()
    }

    fn store_with_subject(id: &str) -> (SqliteStore, SubjectId) {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new(id);
        store.register_subject(&subject, Some("Test Subject")).unwrap();
        (store, subject)
    }

    fn closed(subject: &SubjectId, check_in: Timestamp, check_out: Timestamp) -> Session {
        let mut session = Session::open(subject.clone(), check_in);
        session.check_out = Some(check_out);
        session.estimated_duration = Some(rollcall_util::whole_minutes_between(check_in, check_out));
        session
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_register_subject() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = SubjectId::new("S1");

        assert!(!store.subject_exists(&subject).unwrap());
        assert!(store.register_subject(&subject, Some("Ada")).unwrap());
        assert!(store.subject_exists(&subject).unwrap());

        // Second registration only renames
        assert!(!store.register_subject(&subject, Some("Ada L.")).unwrap());

        let audits = store.get_recent_audits(10).unwrap();
        assert_eq!(audits.len(), 2);
        assert!(matches!(
            &audits[0].event,
            AuditEventType::SubjectRegistered { display_name: Some(name), .. } if name == "Ada L."
        ));
    }

    #[test]
    fn test_open_session_roundtrip() {
        let (store, subject) = store_with_subject("S1");
        assert!(store.find_open_session(&subject).unwrap().is_none());

        let session = Session::open(subject.clone(), ts(8, 0));
        store.insert_session(&session).unwrap();

        let open = store.find_open_session(&subject).unwrap().unwrap();
        assert_eq!(open, session);
    }

    #[test]
    fn test_second_open_session_conflicts() {
        let (store, subject) = store_with_subject("S1");
        store
            .insert_session(&Session::open(subject.clone(), ts(8, 0)))
            .unwrap();

        let result = store.insert_session(&Session::open(subject.clone(), ts(9, 0)));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_session_for_unknown_subject_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.insert_session(&Session::open(SubjectId::new("ghost"), ts(8, 0)));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_checkout_is_conditional() {
        let (store, subject) = store_with_subject("S1");
        let session = Session::open(subject.clone(), ts(8, 0));
        store.insert_session(&session).unwrap();

        store
            .update_session_checkout(&session.id, ts(8, 10), 10)
            .unwrap();
        assert!(store.find_open_session(&subject).unwrap().is_none());

        // Already closed
        let again = store.update_session_checkout(&session.id, ts(8, 20), 20);
        assert!(matches!(again, Err(StoreError::Conflict(_))));

        let stored = &store.sessions_for_subject(&subject, 10).unwrap()[0];
        assert_eq!(stored.check_out, Some(ts(8, 10)));
        assert_eq!(stored.estimated_duration, Some(10));
    }

    #[test]
    fn test_find_overlapping_instant() {
        let (store, subject) = store_with_subject("S1");
        store
            .insert_session(&closed(&subject, ts(8, 0), ts(9, 0)))
            .unwrap();

        let hit = |t| {
            store
                .find_overlapping(&subject, TimeRange::at(t), ts(12, 0), None)
                .unwrap()
                .is_some()
        };
        assert!(hit(ts(8, 0)));
        assert!(hit(ts(8, 30)));
        assert!(!hit(ts(9, 0)));
        assert!(!hit(ts(7, 59)));
    }

    #[test]
    fn test_find_overlapping_open_session_extends_to_now() {
        let (store, subject) = store_with_subject("S1");
        store
            .insert_session(&Session::open(subject.clone(), ts(8, 0)))
            .unwrap();

        let probe = TimeRange::at(ts(10, 0));
        assert!(
            store
                .find_overlapping(&subject, probe, ts(11, 0), None)
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_overlapping(&subject, probe, ts(10, 0), None)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_find_overlapping_range_with_exclusion() {
        let (store, subject) = store_with_subject("S1");
        let earlier = closed(&subject, ts(9, 0), ts(10, 0));
        store.insert_session(&earlier).unwrap();
        let open = Session::open(subject.clone(), ts(8, 0));
        store.insert_session(&open).unwrap();

        let closing = TimeRange::between(ts(8, 0), ts(11, 0));
        let found = store
            .find_overlapping(&subject, closing, ts(11, 0), Some(open.id))
            .unwrap();
        assert_eq!(found.map(|s| s.id), Some(earlier.id));

        // Touching intervals do not overlap
        let touching = TimeRange::between(ts(8, 0), ts(9, 0));
        assert!(
            store
                .find_overlapping(&subject, touching, ts(11, 0), Some(open.id))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_overlap_is_per_subject() {
        let (store, s1) = store_with_subject("S1");
        let s2 = SubjectId::new("S2");
        store.register_subject(&s2, None).unwrap();
        store.insert_session(&closed(&s1, ts(8, 0), ts(9, 0))).unwrap();

        assert!(
            store
                .find_overlapping(&s2, TimeRange::at(ts(8, 30)), ts(12, 0), None)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_sessions_newest_first() {
        let (store, subject) = store_with_subject("S1");
        store
            .insert_session(&closed(&subject, ts(8, 0), ts(9, 0)))
            .unwrap();
        store
            .insert_session(&closed(&subject, ts(10, 0), ts(11, 0)))
            .unwrap();
        store
            .insert_session(&Session::open(subject.clone(), ts(12, 0)))
            .unwrap();

        let sessions = store.sessions_for_subject(&subject, 2).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].check_in, ts(12, 0));
        assert_eq!(sessions[1].check_in, ts(10, 0));
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        let event = AuditEvent::new(AuditEventType::ServiceStarted);
        store.append_audit(event).unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.db");
        let subject = SubjectId::new("S1");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.register_subject(&subject, None).unwrap();
            store
                .insert_session(&Session::open(subject.clone(), ts(8, 0)))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.subject_exists(&subject).unwrap());
        assert!(store.find_open_session(&subject).unwrap().is_some());
    }
}
