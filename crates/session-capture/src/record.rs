//! Archive record format and object keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use worklog_sessions::{SessionId, WorkSession};

/// Capture metadata nested under `_metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Capture instant, ISO-8601 UTC with second precision.
    pub ingested_at: String,
}

/// Immutable snapshot of a completed session as written to the archive.
///
/// ```json
/// {"id": "…", "person_name": "Ada", …, "duration": 37, "status": "COMPLETED",
///  "_metadata": {"ingested_at": "2024-01-01T00:00:40Z"}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    #[serde(flatten)]
    pub session: WorkSession,
    #[serde(rename = "_metadata")]
    pub metadata: CaptureMetadata,
}

impl ArchiveRecord {
    pub fn new(session: WorkSession, captured_at: DateTime<Utc>) -> Self {
        Self {
            session,
            metadata: CaptureMetadata {
                ingested_at: format_ingested_at(&captured_at),
            },
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// `2024-01-01T00:00:40Z`
pub fn format_ingested_at(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Object key for a capture: `{YYYYMMDDHHMMSS}_{id}.json`.
///
/// `attempt > 0` adds a numbered suffix (`{ts}_{id}.{attempt}.json`) used
/// when the plain key is already taken.
pub fn archive_key(captured_at: &DateTime<Utc>, id: &SessionId, attempt: u32) -> String {
    let ts = captured_at.format("%Y%m%d%H%M%S");
    if attempt == 0 {
        format!("{ts}_{id}.json")
    } else {
        format!("{ts}_{id}.{attempt}.json")
    }
}
