//! End-to-end runs of the `worklog` binary against a temporary base directory.

use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

struct Run {
    code: i32,
    stdout: String,
}

impl Run {
    fn json(&self) -> Value {
        serde_json::from_str(self.stdout.trim()).unwrap()
    }

    fn lines(&self) -> Vec<Value> {
        self.stdout
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn worklog(base: &Path, args: &[&str]) -> Run {
    let output = Command::new(env!("CARGO_BIN_EXE_worklog"))
        .arg("--base-dir")
        .arg(base)
        .args(args)
        .env("WORKLOG_LOG_STDERR", "0")
        .env_remove("RUST_LOG")
        .env_remove("WORKLOG_BASE_DIR")
        .env_remove("WORKLOG_SESSION_STORE")
        .env_remove("WORKLOG_ARCHIVE_DIR")
        .env_remove("WORKLOG_WAREHOUSE")
        .env_remove("WORKLOG_CHECKPOINT_DIR")
        .env_remove("WORKLOG_TABLE_NAME")
        .output()
        .unwrap();
    Run {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8(output.stdout).unwrap(),
    }
}

#[test]
fn start_stop_capture_ingest_reset() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();

    let started = worklog(
        base,
        &["start", "--person-name", "Ada", "--process-id", "p-1", "--process-name", "Packing"],
    );
    assert_eq!(started.code, 0);
    let session = started.json();
    assert_eq!(session["status"], "RUNNING");
    let id = session["id"].as_str().unwrap().to_string();

    let stopped = worklog(base, &["stop", "--id", &id]);
    assert_eq!(stopped.code, 0);
    assert_eq!(stopped.json()["status"], "COMPLETED");
    assert!(stopped.json()["duration"].is_u64());

    let again = worklog(base, &["stop", "--id", &id]);
    assert_eq!(again.code, 1);
    assert_eq!(again.json()["error"], "Work already completed");

    let listed = worklog(base, &["list", "--status", "completed"]);
    assert_eq!(listed.json().as_array().unwrap().len(), 1);

    let captured = worklog(base, &["capture"]);
    assert_eq!(captured.code, 0);
    assert_eq!(captured.json()["archived"], 1);
    let archived = std::fs::read_dir(base.join("archive")).unwrap().count();
    assert_eq!(archived, 1);

    // Caught up: the position was committed.
    assert_eq!(worklog(base, &["capture"]).json()["events_seen"], 0);

    let ingested = worklog(base, &["ingest"]);
    assert_eq!(ingested.code, 0);
    assert_eq!(ingested.json()["rows_merged"], 1);
    assert_eq!(worklog(base, &["ingest"]).json()["rows_merged"], 0);

    let rows = worklog(base, &["table"]).lines();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], id.as_str());
    assert_eq!(rows[0]["process_name"], "Packing");

    assert_ne!(worklog(base, &["reset"]).code, 0);
    assert_eq!(worklog(base, &["table"]).lines().len(), 1);

    assert_eq!(worklog(base, &["reset", "--yes"]).code, 0);
    assert!(worklog(base, &["table"]).lines().is_empty());

    assert_eq!(worklog(base, &["ingest"]).json()["rows_merged"], 1);
    assert_eq!(worklog(base, &["table"]).lines().len(), 1);
}

#[test]
fn request_errors_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();

    let missing = worklog(base, &["get", "--id", "no-such-session"]);
    assert_eq!(missing.code, 1);
    assert_eq!(missing.json()["error"], "Work log not found");

    let blank = worklog(base, &["start", "--person-name", " ", "--process-id", "p-1"]);
    assert_eq!(blank.code, 1);
    assert_eq!(blank.json()["error"], "Missing required fields");

    assert!(worklog(base, &["table", "--rescued"]).lines().is_empty());
}

#[test]
fn table_finishes_an_interrupted_reset() {
    let dir = TempDir::new().unwrap();
    let base = dir.path();

    let started = worklog(base, &["start", "--person-name", "Ada", "--process-id", "p-1"]);
    let id = started.json()["id"].as_str().unwrap().to_string();
    assert_eq!(worklog(base, &["stop", "--id", &id]).code, 0);
    assert_eq!(worklog(base, &["capture"]).code, 0);
    assert_eq!(worklog(base, &["ingest"]).json()["rows_merged"], 1);

    // A reset that crashed after writing its marker.
    let marker = base.join("checkpoints").join("work_sessions.reset");
    std::fs::write(&marker, "2024-01-01T00:00:00Z").unwrap();

    let table = worklog(base, &["table"]);
    assert_eq!(table.code, 0);
    assert!(table.lines().is_empty());
    assert!(!marker.exists());

    assert_eq!(worklog(base, &["ingest"]).json()["rows_merged"], 1);
}
