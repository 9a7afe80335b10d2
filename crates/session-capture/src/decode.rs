//! Typed decoder for change-stream payloads.
//!
//! The payload is parsed into [`StreamRecord`] by serde, which already
//! rejects unknown attribute tags and event names. The image is then mapped
//! field by field onto [`WorkSession`]; nothing is guessed.

use crate::error::DecodeError;
use chrono::{DateTime, Utc};
use worklog_sessions::{
    parse_timestamp, AttributeValue, ChangeEnvelope, Image, SessionId, StreamRecord, WorkSession,
    WorkStatus,
};

/// Parses a stored change payload.
pub fn decode_record(envelope: &ChangeEnvelope) -> Result<StreamRecord, DecodeError> {
    Ok(serde_json::from_str(&envelope.payload)?)
}

/// Maps a tagged image onto a work session.
pub fn decode_session(image: &Image) -> Result<WorkSession, DecodeError> {
    let status_text = required_string(image, "status")?;
    let status =
        WorkStatus::parse(&status_text).ok_or(DecodeError::UnknownStatus(status_text))?;

    let session = WorkSession {
        id: SessionId::from(required_string(image, "id")?),
        person_name: required_string(image, "person_name")?,
        process_id: required_string(image, "process_id")?,
        process_name: optional_string(image, "process_name")?,
        start_timestamp: required_timestamp(image, "start_timestamp")?,
        end_timestamp: optional_string(image, "end_timestamp")?
            .map(|raw| timestamp("end_timestamp", raw))
            .transpose()?,
        duration: optional_integer(image, "duration")?,
        status,
    };

    let completed = session.status == WorkStatus::Completed;
    let has_completion = session.end_timestamp.is_some() && session.duration.is_some();
    let has_any_completion = session.end_timestamp.is_some() || session.duration.is_some();
    if completed && !has_completion {
        return Err(DecodeError::Inconsistent(format!(
            "{} is COMPLETED without end_timestamp and duration",
            session.id
        )));
    }
    if !completed && has_any_completion {
        return Err(DecodeError::Inconsistent(format!(
            "{} is RUNNING with completion fields",
            session.id
        )));
    }

    Ok(session)
}

fn attribute<'a>(
    image: &'a Image,
    name: &'static str,
) -> Result<&'a AttributeValue, DecodeError> {
    image.get(name).ok_or(DecodeError::MissingAttribute(name))
}

fn required_string(image: &Image, name: &'static str) -> Result<String, DecodeError> {
    match attribute(image, name)? {
        AttributeValue::S(value) => Ok(value.clone()),
        other => Err(DecodeError::WrongTag {
            attribute: name,
            expected: "S",
            found: other.tag(),
        }),
    }
}

/// `S` or `NULL`; an absent attribute reads as `NULL`.
fn optional_string(image: &Image, name: &'static str) -> Result<Option<String>, DecodeError> {
    match image.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::S(value)) => Ok(Some(value.clone())),
        Some(other) => Err(DecodeError::WrongTag {
            attribute: name,
            expected: "S",
            found: other.tag(),
        }),
    }
}

fn optional_integer(image: &Image, name: &'static str) -> Result<Option<u64>, DecodeError> {
    match image.get(name) {
        None | Some(AttributeValue::Null(_)) => Ok(None),
        Some(AttributeValue::N(value)) => {
            value
                .parse::<u64>()
                .map(Some)
                .map_err(|_| DecodeError::InvalidNumber {
                    attribute: name,
                    value: value.clone(),
                })
        }
        Some(other) => Err(DecodeError::WrongTag {
            attribute: name,
            expected: "N",
            found: other.tag(),
        }),
    }
}

fn required_timestamp(image: &Image, name: &'static str) -> Result<DateTime<Utc>, DecodeError> {
    timestamp(name, required_string(image, name)?)
}

fn timestamp(name: &'static str, raw: String) -> Result<DateTime<Utc>, DecodeError> {
    parse_timestamp(&raw).map_err(|_| DecodeError::InvalidTimestamp {
        attribute: name,
        value: raw,
    })
}
