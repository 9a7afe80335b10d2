//! Fixed ingestion schema.
//!
//! | column | type |
//! |---|---|
//! | `id`, `process_id`, `person_name`, `status` | text, non-null |
//! | `process_name` | text, nullable |
//! | `duration` | float (any JSON number, widened) |
//! | `start_timestamp`, `end_timestamp` | RFC 3339 text |
//! | `_metadata.ingested_at` | RFC 3339 text, nested |
//!
//! Extra top-level fields become nullable text columns holding the JSON
//! rendering of the value. Anything else is rescued with a reason.

use chrono::DateTime;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use worklog_config_and_utils::is_valid_identifier;

/// Columns every table carries besides the extra ones, in table order.
pub const FIXED_COLUMNS: [&str; 11] = [
    "id",
    "process_id",
    "process_name",
    "person_name",
    "status",
    "duration",
    "start_timestamp",
    "end_timestamp",
    METADATA_INGESTED_AT,
    SOURCE_OBJECT,
    INGESTED_BATCH,
];

/// Names SQLite resolves to the implicit row id.
const ROWID_ALIASES: [&str; 3] = ["rowid", "oid", "_rowid_"];

/// Flattened `_metadata.ingested_at`.
pub const METADATA_INGESTED_AT: &str = "_metadata_ingested_at";
/// Archive key the row came from.
pub const SOURCE_OBJECT: &str = "_source_object";
/// Checkpoint batch that merged the row.
pub const INGESTED_BATCH: &str = "_ingested_batch";

const METADATA: &str = "_metadata";

/// Why a record was routed to the rescue table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RescueReason {
    #[error("not valid JSON: {0}")]
    NotJson(String),

    #[error("top-level value is not an object")]
    NotObject,

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("required field {0} is null")]
    NullField(&'static str),

    #[error("field {field} is not a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field {field} is not an RFC 3339 timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("extra field {0:?} cannot be used as a column name")]
    InvalidColumnName(String),
}

/// A record that passed the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRow {
    pub id: String,
    pub process_id: String,
    pub process_name: Option<String>,
    pub person_name: String,
    pub status: String,
    pub duration: f64,
    pub start_timestamp: String,
    pub end_timestamp: String,
    pub ingested_at: String,
    /// Extra top-level fields: column name to JSON text (`None` for null).
    pub extra: BTreeMap<String, Option<String>>,
}

/// Validates raw archive objects against the fixed schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSchema;

impl IngestSchema {
    pub fn new() -> Self {
        Self
    }

    /// Parses and validates one object.
    pub fn validate(&self, raw: &[u8]) -> Result<IngestRow, RescueReason> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|e| RescueReason::NotJson(e.to_string()))?;
        let Value::Object(object) = value else {
            return Err(RescueReason::NotObject);
        };

        let metadata = match object.get(METADATA) {
            None => return Err(RescueReason::MissingField("_metadata.ingested_at")),
            Some(Value::Null) => return Err(RescueReason::NullField("_metadata.ingested_at")),
            Some(Value::Object(metadata)) => metadata,
            Some(_) => {
                return Err(RescueReason::WrongType {
                    field: METADATA,
                    expected: "object",
                })
            }
        };

        Ok(IngestRow {
            id: required_text(&object, "id")?,
            process_id: required_text(&object, "process_id")?,
            process_name: nullable_text(&object, "process_name")?,
            person_name: required_text(&object, "person_name")?,
            status: required_text(&object, "status")?,
            duration: required_number(&object, "duration")?,
            start_timestamp: required_timestamp(&object, "start_timestamp")?,
            end_timestamp: required_timestamp(&object, "end_timestamp")?,
            ingested_at: required_timestamp_as(metadata, "ingested_at", "_metadata.ingested_at")?,
            extra: extra_columns(&object)?,
        })
    }
}

fn field<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    name: &'static str,
) -> Result<&'a Value, RescueReason> {
    match object.get(key) {
        None => Err(RescueReason::MissingField(name)),
        Some(Value::Null) => Err(RescueReason::NullField(name)),
        Some(value) => Ok(value),
    }
}

fn required_text(object: &Map<String, Value>, name: &'static str) -> Result<String, RescueReason> {
    match field(object, name, name)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(RescueReason::WrongType {
            field: name,
            expected: "string",
        }),
    }
}

/// Present but possibly null.
fn nullable_text(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, RescueReason> {
    match object.get(name) {
        None => Err(RescueReason::MissingField(name)),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RescueReason::WrongType {
            field: name,
            expected: "string",
        }),
    }
}

fn required_number(object: &Map<String, Value>, name: &'static str) -> Result<f64, RescueReason> {
    field(object, name, name)?
        .as_f64()
        .ok_or(RescueReason::WrongType {
            field: name,
            expected: "number",
        })
}

fn required_timestamp(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<String, RescueReason> {
    required_timestamp_as(object, name, name)
}

fn required_timestamp_as(
    object: &Map<String, Value>,
    key: &str,
    name: &'static str,
) -> Result<String, RescueReason> {
    let text = match field(object, key, name)? {
        Value::String(s) => s.clone(),
        _ => {
            return Err(RescueReason::WrongType {
                field: name,
                expected: "string",
            })
        }
    };
    if DateTime::parse_from_rfc3339(&text).is_err() {
        return Err(RescueReason::InvalidTimestamp { field: name, value: text });
    }
    Ok(text)
}

fn is_known_field(key: &str) -> bool {
    key == METADATA || FIXED_COLUMNS[..8].contains(&key)
}

fn extra_columns(
    object: &Map<String, Value>,
) -> Result<BTreeMap<String, Option<String>>, RescueReason> {
    let mut extra = BTreeMap::new();
    for (key, value) in object {
        if is_known_field(key) {
            continue;
        }
        let lowered = key.to_ascii_lowercase();
        let reserved = FIXED_COLUMNS.contains(&lowered.as_str())
            || ROWID_ALIASES.contains(&lowered.as_str())
            || lowered == METADATA;
        if !is_valid_identifier(key) || reserved {
            return Err(RescueReason::InvalidColumnName(key.clone()));
        }
        let rendered = match value {
            Value::Null => None,
            other => Some(other.to_string()),
        };
        extra.insert(key.clone(), rendered);
    }
    Ok(extra)
}
