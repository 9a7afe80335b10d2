//! Session store migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::error::SessionResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> SessionResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version >= CURRENT_VERSION {
        debug!(current_version, "Session store schema up to date");
        return Ok(());
    }

    info!(
        current_version,
        target_version = CURRENT_VERSION,
        "Running session store migrations"
    );

    if current_version < 1 {
        migrate_v1_work_sessions(conn)?;
    }
    if current_version < 2 {
        migrate_v2_change_stream(conn)?;
    }

    info!("Session store migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> SessionResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: work session table with the status invariants as CHECK constraints.
fn migrate_v1_work_sessions(conn: &Connection) -> SessionResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS work_sessions (
            id TEXT PRIMARY KEY,
            person_name TEXT NOT NULL,
            process_id TEXT NOT NULL,
            process_name TEXT,
            start_timestamp TEXT NOT NULL,
            end_timestamp TEXT,
            duration INTEGER,
            status TEXT NOT NULL CHECK (status IN ('RUNNING', 'COMPLETED')),
            CHECK (
                (status = 'RUNNING' AND end_timestamp IS NULL AND duration IS NULL)
                OR (status = 'COMPLETED' AND end_timestamp IS NOT NULL
                    AND duration IS NOT NULL AND duration >= 0)
            )
        );

        CREATE INDEX IF NOT EXISTS idx_work_sessions_status ON work_sessions(status);
        "#,
    )?;
    record_migration(conn, 1, "work_sessions")
}

/// V2: change stream (outbox) and consumer positions.
fn migrate_v2_change_stream(conn: &Connection) -> SessionResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS change_stream (
            sequence_number INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL UNIQUE,
            session_id TEXT NOT NULL,
            event_name TEXT NOT NULL CHECK (event_name IN ('INSERT', 'MODIFY', 'REMOVE')),
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_change_stream_session ON change_stream(session_id);

        CREATE TABLE IF NOT EXISTS stream_consumers (
            consumer TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    record_migration(conn, 2, "change_stream")
}
