//! Row-level change stream.
//!
//! Every committed mutation of the session table produces one
//! [`StreamRecord`], written to the `change_stream` table in the same
//! transaction as the mutation itself. Record images use a tagged attribute
//! representation so a consumer never has to guess a value's type.
//!
//! ```text
//! {"S": "Ada"}  {"N": "37"}  {"NULL": true}  {"BOOL": false}
//! {"M": {"k": {"S": "v"}}}  {"L": [{"N": "1"}]}
//! ```

use crate::types::{format_timestamp, SessionId, WorkSession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single tagged attribute value.
///
/// Externally tagged: an object with exactly one of the keys below. Any
/// other tag fails deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    /// Numbers travel as decimal strings.
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "M")]
    M(BTreeMap<String, AttributeValue>),
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Tag name as it appears on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::Null(_) => "NULL",
            AttributeValue::M(_) => "M",
            AttributeValue::L(_) => "L",
        }
    }

    fn string_or_null(value: Option<&str>) -> Self {
        match value {
            Some(v) => AttributeValue::S(v.to_string()),
            None => AttributeValue::Null(true),
        }
    }
}

/// Attribute name to value.
pub type Image = BTreeMap<String, AttributeValue>;

/// Kind of row mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Insert => "INSERT",
            EventName::Modify => "MODIFY",
            EventName::Remove => "REMOVE",
        }
    }
}

/// Wire form of one change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub event_id: String,
    pub event_name: EventName,
    pub keys: Image,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Image>,
    pub approximate_creation_time: DateTime<Utc>,
}

impl StreamRecord {
    /// Builds the record for a session mutation.
    pub fn for_session(
        event_name: EventName,
        id: &SessionId,
        old: Option<&WorkSession>,
        new: Option<&WorkSession>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_name,
            keys: key_image(id),
            old_image: old.map(WorkSession::to_image),
            new_image: new.map(WorkSession::to_image),
            approximate_creation_time: at,
        }
    }
}

/// A stored change event as read from the feed.
///
/// The payload is kept as the raw JSON text; consumers decode it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEnvelope {
    /// Position in the feed, strictly increasing in commit order.
    pub sequence_number: i64,
    pub session_id: SessionId,
    pub event_name: String,
    pub payload: String,
}

/// Image holding only the primary key.
pub fn key_image(id: &SessionId) -> Image {
    let mut keys = Image::new();
    keys.insert("id".to_string(), AttributeValue::S(id.to_string()));
    keys
}

impl WorkSession {
    /// Encodes the session as a tagged attribute image.
    ///
    /// Absent optional fields are encoded as `NULL`.
    pub fn to_image(&self) -> Image {
        let mut image = Image::new();
        image.insert("id".into(), AttributeValue::S(self.id.to_string()));
        image.insert(
            "person_name".into(),
            AttributeValue::S(self.person_name.clone()),
        );
        image.insert(
            "process_id".into(),
            AttributeValue::S(self.process_id.clone()),
        );
        image.insert(
            "process_name".into(),
            AttributeValue::string_or_null(self.process_name.as_deref()),
        );
        image.insert(
            "start_timestamp".into(),
            AttributeValue::S(format_timestamp(&self.start_timestamp)),
        );
        image.insert(
            "end_timestamp".into(),
            AttributeValue::string_or_null(
                self.end_timestamp.as_ref().map(format_timestamp).as_deref(),
            ),
        );
        image.insert(
            "duration".into(),
            match self.duration {
                Some(d) => AttributeValue::N(d.to_string()),
                None => AttributeValue::Null(true),
            },
        );
        image.insert(
            "status".into(),
            AttributeValue::S(self.status.as_str().to_string()),
        );
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkStatus;
    use chrono::TimeZone;

    fn completed() -> WorkSession {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        WorkSession {
            id: SessionId::from("s-1"),
            person_name: "Ada".into(),
            process_id: "p-1".into(),
            process_name: Some("Packing".into()),
            start_timestamp: start,
            end_timestamp: Some(start + chrono::Duration::seconds(37)),
            duration: Some(37),
            status: WorkStatus::Completed,
        }
    }

    #[test]
    fn attribute_values_use_wire_tags() {
        let json = serde_json::to_string(&AttributeValue::N("37".into())).unwrap();
        assert_eq!(json, r#"{"N":"37"}"#);
        let json = serde_json::to_string(&AttributeValue::Null(true)).unwrap();
        assert_eq!(json, r#"{"NULL":true}"#);

        let nested: AttributeValue =
            serde_json::from_str(r#"{"M":{"tags":{"L":[{"S":"a"},{"BOOL":true}]}}}"#).unwrap();
        assert_eq!(nested.tag(), "M");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = serde_json::from_str::<AttributeValue>(r#"{"SS":["a","b"]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn image_encodes_every_field() {
        let image = completed().to_image();
        assert_eq!(image.len(), 8);
        assert_eq!(image["duration"], AttributeValue::N("37".into()));
        assert_eq!(image["status"], AttributeValue::S("COMPLETED".into()));
        assert_eq!(
            image["end_timestamp"],
            AttributeValue::S("2024-01-01T00:00:37.000000Z".into())
        );
    }

    #[test]
    fn running_image_uses_null_for_absent_fields() {
        let mut session = completed();
        session.status = WorkStatus::Running;
        session.end_timestamp = None;
        session.duration = None;
        session.process_name = None;

        let image = session.to_image();
        assert_eq!(image["end_timestamp"], AttributeValue::Null(true));
        assert_eq!(image["duration"], AttributeValue::Null(true));
        assert_eq!(image["process_name"], AttributeValue::Null(true));
    }

    #[test]
    fn insert_record_omits_old_image() {
        let session = completed();
        let record = StreamRecord::for_session(
            EventName::Insert,
            &session.id,
            None,
            Some(&session),
            session.start_timestamp,
        );

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event_name"], "INSERT");
        assert_eq!(json["keys"]["id"]["S"], "s-1");
        assert!(json.get("old_image").is_none());
        assert_eq!(json["new_image"]["person_name"]["S"], "Ada");
    }
}
