//! Scenario tests for the ingestion engine.
//!
//! - `runs.rs`     - incremental drains, rescues, skipped and unreadable objects
//! - `recovery.rs` - pending batches and reset journaling
//! - `merge.rs`    - upsert mode and column evolution

mod runs;

use crate::engine::{IngestConfig, IngestEngine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use session_capture::{
    archive_key, ArchiveRecord, ArchiveStore, MemoryArchiveStore, WritePrecondition,
};
use std::path::Path;
use std::sync::Arc;
use worklog_config_and_utils::MergeMode;
use worklog_sessions::{SessionId, WorkSession, WorkStatus};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub(crate) fn completed(id: &str, seconds: i64) -> WorkSession {
    WorkSession {
        id: SessionId::from(id),
        person_name: "Ada".into(),
        process_id: "p-1".into(),
        process_name: Some("Packing".into()),
        start_timestamp: t0(),
        end_timestamp: Some(t0() + Duration::seconds(seconds)),
        duration: Some(seconds as u64),
        status: WorkStatus::Completed,
    }
}

/// Archives `session` the way the capture processor does. Returns the key.
pub(crate) fn archive_session(
    archive: &MemoryArchiveStore,
    session: WorkSession,
    captured_at: DateTime<Utc>,
    attempt: u32,
) -> String {
    let key = archive_key(&captured_at, &session.id, attempt);
    let bytes = ArchiveRecord::new(session, captured_at)
        .to_json_bytes()
        .unwrap();
    archive
        .put(&key, &bytes, WritePrecondition::DoesNotExist)
        .unwrap();
    key
}

pub(crate) fn put_raw(archive: &MemoryArchiveStore, key: &str, bytes: &[u8]) {
    archive.put(key, bytes, WritePrecondition::None).unwrap();
}

pub(crate) fn engine(
    dir: &Path,
    archive: Arc<MemoryArchiveStore>,
    mode: MergeMode,
) -> IngestEngine<Arc<MemoryArchiveStore>> {
    let config = IngestConfig {
        merge_mode: mode,
        ..IngestConfig::in_dir(dir)
    };
    IngestEngine::open(archive, config).unwrap()
}
