use super::*;
use crate::error::IngestError;
use crate::schema::{METADATA_INGESTED_AT, SOURCE_OBJECT};
use session_capture::{ArchiveError, ObjectMeta, WriteOutcome};
use tempfile::TempDir;

#[test]
fn valid_and_invalid_objects_split_between_tables() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    for (i, id) in ["s-1", "s-2", "s-3"].iter().enumerate() {
        archive_session(&archive, completed(id, 37), t0() + Duration::seconds(i as i64), 0);
    }
    put_raw(&archive, "20240101000009_s-bad.json", b"{\"id\": \"s-bad\"");

    let mut engine = engine(dir.path(), archive, MergeMode::Append);
    let report = engine.drain_once().unwrap();

    assert_eq!(report.batch_id, Some(0));
    assert_eq!(report.objects_seen, 4);
    assert_eq!(report.rows_merged, 3);
    assert_eq!(report.rescued, 1);
    assert_eq!(engine.warehouse().row_count().unwrap(), 3);
    assert_eq!(engine.warehouse().rescued_count().unwrap(), 1);

    let consumed = engine.checkpoint().consumed_keys().unwrap();
    assert_eq!(consumed.len(), 4);
    assert!(consumed.contains("20240101000009_s-bad.json"));

    let rescued = &engine.warehouse().rescued_rows().unwrap()[0];
    assert_eq!(rescued["raw_payload"], "{\"id\": \"s-bad\"");
    assert!(rescued["reason"].as_str().unwrap().starts_with("not valid JSON"));
}

#[test]
fn rows_carry_flattened_metadata_and_source() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    let key = archive_session(&archive, completed("s-1", 37), t0() + Duration::seconds(40), 0);

    let mut engine = engine(dir.path(), archive, MergeMode::Append);
    engine.drain_once().unwrap();

    let rows = engine.warehouse().rows().unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["id"], "s-1");
    assert_eq!(row["duration"], 37.0);
    assert_eq!(row["status"], "COMPLETED");
    assert_eq!(row["process_name"], "Packing");
    assert_eq!(row[METADATA_INGESTED_AT], "2024-01-01T00:00:40Z");
    assert_eq!(row[SOURCE_OBJECT], key.as_str());
}

#[test]
fn second_run_adds_nothing() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    archive_session(&archive, completed("s-1", 37), t0(), 0);

    let mut engine = engine(dir.path(), archive, MergeMode::Append);
    engine.drain_once().unwrap();
    let again = engine.drain_once().unwrap();

    assert_eq!(again.batch_id, None);
    assert_eq!(again.objects_seen, 0);
    assert_eq!(engine.warehouse().row_count().unwrap(), 1);
}

#[test]
fn later_objects_form_the_next_batch() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    archive_session(&archive, completed("s-1", 37), t0(), 0);

    let mut engine = engine(dir.path(), archive.clone(), MergeMode::Append);
    engine.drain_once().unwrap();

    archive_session(&archive, completed("s-2", 12), t0() + Duration::seconds(60), 0);
    let report = engine.drain_once().unwrap();
    assert_eq!(report.batch_id, Some(1));
    assert_eq!(report.objects_seen, 1);
    assert_eq!(engine.warehouse().row_count().unwrap(), 2);
}

#[test]
fn checkpoint_survives_a_new_engine() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    archive_session(&archive, completed("s-1", 37), t0(), 0);

    engine(dir.path(), archive.clone(), MergeMode::Append)
        .drain_once()
        .unwrap();
    let mut reopened = engine(dir.path(), archive, MergeMode::Append);
    assert_eq!(reopened.drain_once().unwrap().objects_seen, 0);
    assert_eq!(reopened.warehouse().row_count().unwrap(), 1);
}

#[test]
fn non_json_objects_are_skipped() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    archive_session(&archive, completed("s-1", 37), t0(), 0);
    put_raw(&archive, "README.txt", b"not a record");

    let mut engine = engine(dir.path(), archive, MergeMode::Append);
    let report = engine.drain_once().unwrap();

    assert_eq!(report.skipped_non_json, 1);
    assert_eq!(report.objects_seen, 1);
    assert_eq!(engine.warehouse().rescued_count().unwrap(), 0);
    assert!(!engine.checkpoint().consumed_keys().unwrap().contains("README.txt"));
}

#[test]
fn empty_archive_is_a_quiet_no_op() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine(dir.path(), Arc::new(MemoryArchiveStore::new()), MergeMode::Append);
    assert_eq!(engine.drain_once().unwrap(), crate::IngestReport::default());
    assert_eq!(engine.warehouse().row_count().unwrap(), 0);
}

/// Lists one object that can never be read.
struct UnreadableArchive {
    inner: MemoryArchiveStore,
    broken: String,
}

impl ArchiveStore for UnreadableArchive {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, ArchiveError> {
        self.inner.put(key, bytes, precondition)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError> {
        if key == self.broken {
            return Err(ArchiveError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        self.inner.get(key)
    }

    fn list(&self) -> Result<Vec<ObjectMeta>, ArchiveError> {
        self.inner.list()
    }

    fn exists(&self, key: &str) -> Result<bool, ArchiveError> {
        self.inner.exists(key)
    }
}

#[test]
fn unreadable_object_fails_before_the_checkpoint_moves() {
    let dir = TempDir::new().unwrap();
    let inner = MemoryArchiveStore::new();
    archive_session(&inner, completed("s-1", 37), t0(), 0);
    let broken = archive_session(&inner, completed("s-2", 5), t0() + Duration::seconds(1), 0);

    let archive = UnreadableArchive { inner, broken };
    let mut engine = IngestEngine::open(archive, IngestConfig::in_dir(dir.path())).unwrap();

    let err = engine.drain_once().unwrap_err();
    assert!(matches!(err, IngestError::Archive(ArchiveError::Io { .. })));
    assert_eq!(engine.checkpoint().latest_batch_id().unwrap(), None);
    assert!(engine.checkpoint().consumed_keys().unwrap().is_empty());
    assert_eq!(engine.warehouse().row_count().unwrap(), 0);
}

#[tokio::test]
async fn continuous_run_picks_up_new_objects_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let archive = Arc::new(MemoryArchiveStore::new());
    archive_session(&archive, completed("s-1", 37), t0(), 0);

    let mut engine = engine(dir.path(), archive.clone(), MergeMode::Append);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        archive_session(&archive, completed("s-2", 3), t0() + Duration::seconds(9), 0);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();
    });

    engine
        .run_continuous(std::time::Duration::from_millis(10), rx)
        .await
        .unwrap();
    stopper.await.unwrap();

    assert_eq!(engine.warehouse().row_count().unwrap(), 2);
}
