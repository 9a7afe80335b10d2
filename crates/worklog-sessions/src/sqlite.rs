//! SQLite storage for work sessions and their change stream.
//!
//! Every mutation and its change record commit in one transaction, so the
//! change stream never shows a write that was rolled back and never misses
//! one that committed.

use crate::error::{SessionError, SessionResult};
use crate::migrations::run_migrations;
use crate::store::{ChangeFeed, CompleteOutcome, SessionStore};
use crate::stream::{ChangeEnvelope, EventName, StreamRecord};
use crate::types::{
    format_timestamp, parse_timestamp, Completion, SessionId, WorkSession, WorkStatus,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SESSION_COLUMNS: &str = "id, person_name, process_id, process_name, \
     start_timestamp, end_timestamp, duration, status";

/// Wait this long for a competing writer before reporting the store busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Opens (or creates) the store at `path` and runs migrations.
    pub fn open(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::TransientStore(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        run_migrations(&conn)?;

        info!(path = %path.display(), "Session store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store. Useful for testing.
    pub fn in_memory() -> SessionResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Raw column values of one `work_sessions` row.
struct SessionRow {
    id: String,
    person_name: String,
    process_id: String,
    process_name: Option<String>,
    start_timestamp: String,
    end_timestamp: Option<String>,
    duration: Option<i64>,
    status: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            person_name: row.get(1)?,
            process_id: row.get(2)?,
            process_name: row.get(3)?,
            start_timestamp: row.get(4)?,
            end_timestamp: row.get(5)?,
            duration: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_session(self) -> SessionResult<WorkSession> {
        let status = WorkStatus::parse(&self.status).ok_or_else(|| {
            SessionError::Corrupt(format!("{}: unknown status {:?}", self.id, self.status))
        })?;
        let start_timestamp = parse_stored_timestamp(&self.id, &self.start_timestamp)?;
        let end_timestamp = self
            .end_timestamp
            .as_deref()
            .map(|raw| parse_stored_timestamp(&self.id, raw))
            .transpose()?;
        let duration = self
            .duration
            .map(u64::try_from)
            .transpose()
            .map_err(|_| SessionError::Corrupt(format!("{}: negative duration", self.id)))?;

        Ok(WorkSession {
            id: SessionId::from(self.id),
            person_name: self.person_name,
            process_id: self.process_id,
            process_name: self.process_name,
            start_timestamp,
            end_timestamp,
            duration,
            status,
        })
    }
}

fn parse_stored_timestamp(id: &str, raw: &str) -> SessionResult<DateTime<Utc>> {
    parse_timestamp(raw)
        .map_err(|e| SessionError::Corrupt(format!("{}: bad timestamp {:?}: {}", id, raw, e)))
}

fn select_session(conn: &Connection, id: &SessionId) -> SessionResult<Option<WorkSession>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM work_sessions WHERE id = ?1");
    conn.query_row(&sql, params![id.as_str()], SessionRow::from_row)
        .optional()?
        .map(SessionRow::into_session)
        .transpose()
}

/// Appends one change record. Must run inside the mutation's transaction.
fn append_change(conn: &Connection, record: &StreamRecord, id: &SessionId) -> SessionResult<i64> {
    let payload = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO change_stream (event_id, session_id, event_name, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.event_id,
            id.as_str(),
            record.event_name.as_str(),
            payload,
            format_timestamp(&record.approximate_creation_time),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl SessionStore for SqliteSessionStore {
    fn insert(&self, session: &WorkSession) -> SessionResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO work_sessions
                (id, person_name, process_id, process_name, start_timestamp,
                 end_timestamp, duration, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session.id.as_str(),
                session.person_name,
                session.process_id,
                session.process_name,
                format_timestamp(&session.start_timestamp),
                session.end_timestamp.as_ref().map(format_timestamp),
                session.duration.map(|d| d as i64),
                session.status.as_str(),
            ],
        );
        match inserted {
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                return Err(SessionError::Conflict(session.id.clone()));
            }
            other => {
                other?;
            }
        }

        let record = StreamRecord::for_session(
            EventName::Insert,
            &session.id,
            None,
            Some(session),
            session.start_timestamp,
        );
        let sequence = append_change(&tx, &record, &session.id)?;
        tx.commit()?;

        debug!(session_id = %session.id, sequence, "Work session inserted");
        Ok(())
    }

    fn get(&self, id: &SessionId) -> SessionResult<Option<WorkSession>> {
        let conn = self.conn.lock();
        select_session(&conn, id)
    }

    fn complete_if_running(
        &self,
        id: &SessionId,
        completion: Completion,
    ) -> SessionResult<CompleteOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sql = format!(
            "UPDATE work_sessions
             SET end_timestamp = ?2, duration = ?3, status = 'COMPLETED'
             WHERE id = ?1 AND status = 'RUNNING'
             RETURNING {SESSION_COLUMNS}"
        );
        let updated = tx
            .query_row(
                &sql,
                params![
                    id.as_str(),
                    format_timestamp(&completion.end_timestamp),
                    completion.duration as i64,
                ],
                SessionRow::from_row,
            )
            .optional()?;

        let Some(row) = updated else {
            // Nothing matched: either no such id or it is no longer RUNNING.
            return Ok(match select_session(&tx, id)? {
                None => CompleteOutcome::NotFound,
                Some(current) => CompleteOutcome::AlreadyCompleted(current),
            });
        };

        let after = row.into_session()?;
        let before = WorkSession {
            end_timestamp: None,
            duration: None,
            status: WorkStatus::Running,
            ..after.clone()
        };
        let record = StreamRecord::for_session(
            EventName::Modify,
            id,
            Some(&before),
            Some(&after),
            completion.end_timestamp,
        );
        let sequence = append_change(&tx, &record, id)?;
        tx.commit()?;

        debug!(session_id = %id, sequence, duration = completion.duration, "Work session completed");
        Ok(CompleteOutcome::Completed(after))
    }

    fn list(&self, status: Option<WorkStatus>) -> SessionResult<Vec<WorkSession>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM work_sessions
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY start_timestamp, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![status.map(|s| s.as_str())], SessionRow::from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_session()?);
        }
        Ok(sessions)
    }
}

impl ChangeFeed for SqliteSessionStore {
    fn read_changes(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> SessionResult<Vec<ChangeEnvelope>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT sequence_number, session_id, event_name, payload
             FROM change_stream
             WHERE sequence_number > ?1
             ORDER BY sequence_number
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![after_sequence, limit], |row| {
            Ok(ChangeEnvelope {
                sequence_number: row.get(0)?,
                session_id: SessionId::from(row.get::<_, String>(1)?),
                event_name: row.get(2)?,
                payload: row.get(3)?,
            })
        })?;

        let mut changes = Vec::new();
        for row in rows {
            changes.push(row?);
        }
        Ok(changes)
    }

    fn latest_sequence(&self) -> SessionResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM change_stream",
            [],
            |row| row.get(0),
        )?)
    }

    fn consumer_position(&self, consumer: &str) -> SessionResult<i64> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT position FROM stream_consumers WHERE consumer = ?1",
                params![consumer],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0))
    }

    fn commit_consumer_position(&self, consumer: &str, position: i64) -> SessionResult<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT INTO stream_consumers (consumer, position, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(consumer) DO UPDATE
                SET position = excluded.position, updated_at = excluded.updated_at
                WHERE excluded.position > stream_consumers.position",
            params![consumer, position, format_timestamp(&Utc::now())],
        )?;

        if changed == 0 {
            debug!(consumer, position, "Ignoring consumer position regression");
        }
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn running(id: &str) -> WorkSession {
        let input = machine::validate_start("Ada", "p-1", Some("Packing")).unwrap();
        machine::begin(input, SessionId::from(id), t0())
    }

    fn completion(secs: i64) -> Completion {
        Completion {
            end_timestamp: t0() + chrono::Duration::seconds(secs),
            duration: secs as u64,
        }
    }

    #[test]
    fn insert_and_get() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let session = running("s-1");
        store.insert(&session).unwrap();

        assert_eq!(store.get(&session.id).unwrap(), Some(session));
        assert_eq!(store.get(&SessionId::from("missing")).unwrap(), None);
    }

    #[test]
    fn duplicate_insert_is_conflict() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let session = running("s-1");
        store.insert(&session).unwrap();

        let err = store.insert(&session).unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
        assert_eq!(store.latest_sequence().unwrap(), 1);
    }

    #[test]
    fn complete_if_running_returns_post_write_row() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let session = running("s-1");
        store.insert(&session).unwrap();

        let after = match store.complete_if_running(&session.id, completion(37)).unwrap() {
            CompleteOutcome::Completed(after) => after,
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(after.status, WorkStatus::Completed);
        assert_eq!(after.duration, Some(37));
        assert_eq!(store.get(&session.id).unwrap(), Some(after));
    }

    #[test]
    fn complete_classifies_missing_and_completed() {
        let store = SqliteSessionStore::in_memory().unwrap();
        assert_eq!(
            store
                .complete_if_running(&SessionId::from("nope"), completion(1))
                .unwrap(),
            CompleteOutcome::NotFound
        );

        let session = running("s-1");
        store.insert(&session).unwrap();
        store.complete_if_running(&session.id, completion(5)).unwrap();

        let current = match store.complete_if_running(&session.id, completion(9)).unwrap() {
            CompleteOutcome::AlreadyCompleted(current) => current,
            other => panic!("expected conflict, got {other:?}"),
        };
        assert_eq!(current.duration, Some(5));
    }

    #[test]
    fn list_filters_by_status() {
        let store = SqliteSessionStore::in_memory().unwrap();
        store.insert(&running("a")).unwrap();
        store.insert(&running("b")).unwrap();
        store
            .complete_if_running(&SessionId::from("b"), completion(3))
            .unwrap();

        assert_eq!(store.list(None).unwrap().len(), 2);
        let running_only = store.list(Some(WorkStatus::Running)).unwrap();
        assert_eq!(running_only.len(), 1);
        assert_eq!(running_only[0].id, SessionId::from("a"));
        assert_eq!(store.list(Some(WorkStatus::Completed)).unwrap().len(), 1);
    }

    #[test]
    fn open_on_disk_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.sqlite");

        {
            let store = SqliteSessionStore::open(&path).unwrap();
            store.insert(&running("s-1")).unwrap();
        }

        let store = SqliteSessionStore::open(&path).unwrap();
        assert!(store.get(&SessionId::from("s-1")).unwrap().is_some());
        assert_eq!(store.latest_sequence().unwrap(), 1);
    }

    #[test]
    fn consumer_positions_only_move_forward() {
        let store = SqliteSessionStore::in_memory().unwrap();
        assert_eq!(store.consumer_position("capture").unwrap(), 0);

        assert!(store.commit_consumer_position("capture", 4).unwrap());
        assert!(!store.commit_consumer_position("capture", 2).unwrap());
        assert_eq!(store.consumer_position("capture").unwrap(), 4);

        assert!(store.commit_consumer_position("capture", 7).unwrap());
        assert_eq!(store.consumer_position("capture").unwrap(), 7);
        assert_eq!(store.consumer_position("other").unwrap(), 0);
    }
}
