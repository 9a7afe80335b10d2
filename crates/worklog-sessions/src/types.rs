//! Core types for work sessions.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a work session (UUID string).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a session ID from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a work session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    Running,
    Completed,
}

impl WorkStatus {
    /// Stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Running => "RUNNING",
            WorkStatus::Completed => "COMPLETED",
        }
    }

    /// Parses the stored representation. Unknown text is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(WorkStatus::Running),
            "COMPLETED" => Some(WorkStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of manual work performed by one person against one process.
///
/// `end_timestamp` and `duration` are present exactly when the status is
/// `COMPLETED`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: SessionId,
    pub person_name: String,
    pub process_id: String,
    pub process_name: Option<String>,
    #[serde(with = "rfc3339")]
    pub start_timestamp: DateTime<Utc>,
    #[serde(default, with = "rfc3339_option")]
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Whole seconds between start and end, truncated.
    pub duration: Option<u64>,
    pub status: WorkStatus,
}

impl WorkSession {
    pub fn is_running(&self) -> bool {
        self.status == WorkStatus::Running
    }
}

/// Validated input for starting a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewWorkSession {
    pub person_name: String,
    pub process_id: String,
    pub process_name: Option<String>,
}

/// The fields written when a session completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub end_timestamp: DateTime<Utc>,
    pub duration: u64,
}

/// Formats an instant as RFC 3339 with microseconds and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses an RFC 3339 instant into UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod rfc3339_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_id_roundtrips_through_display() {
        let id = SessionId::new();
        assert_eq!(SessionId::from(id.to_string()), id);
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn status_parse_rejects_unknown_text() {
        assert_eq!(WorkStatus::parse("RUNNING"), Some(WorkStatus::Running));
        assert_eq!(WorkStatus::parse("COMPLETED"), Some(WorkStatus::Completed));
        assert_eq!(WorkStatus::parse("running"), None);
        assert_eq!(WorkStatus::parse("PAUSED"), None);
    }

    #[test]
    fn timestamps_use_micros_and_z() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 37).unwrap()
            + chrono::Duration::milliseconds(900);
        assert_eq!(format_timestamp(&ts), "2024-01-01T00:00:37.900000Z");
        assert_eq!(parse_timestamp("2024-01-01T00:00:37.900000Z").unwrap(), ts);
        assert_eq!(parse_timestamp("2024-01-01T01:00:37.9+01:00").unwrap(), ts);
    }

    #[test]
    fn running_session_serializes_nulls() {
        let session = WorkSession {
            id: SessionId::from("abc"),
            person_name: "Ada".into(),
            process_id: "p-1".into(),
            process_name: None,
            start_timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end_timestamp: None,
            duration: None,
            status: WorkStatus::Running,
        };

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["status"], "RUNNING");
        assert_eq!(json["start_timestamp"], "2024-01-01T00:00:00.000000Z");
        assert!(json["end_timestamp"].is_null());
        assert!(json["duration"].is_null());

        let back: WorkSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }
}
