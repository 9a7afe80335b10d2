//! Capture error types.

use crate::archive::ArchiveError;
use thiserror::Error;
use worklog_sessions::SessionError;

/// A change event that cannot be turned into a work session.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Malformed JSON, unknown attribute tag or unknown event name
    #[error("Malformed change record: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Change record has no new image")]
    MissingImage,

    #[error("Missing attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Attribute {attribute} has tag {found}, expected {expected}")]
    WrongTag {
        attribute: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Attribute {attribute} is not a non-negative integer: {value:?}")]
    InvalidNumber {
        attribute: &'static str,
        value: String,
    },

    #[error("Attribute {attribute} is not an RFC 3339 timestamp: {value:?}")]
    InvalidTimestamp {
        attribute: &'static str,
        value: String,
    },

    #[error("Unknown status {0:?}")]
    UnknownStatus(String),

    #[error("Inconsistent record: {0}")]
    Inconsistent(String),
}

/// Capture error type.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Decode error at sequence {sequence}: {source}")]
    Decode {
        sequence: i64,
        #[source]
        source: DecodeError,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Reading the change stream or committing the consumer position failed
    #[error("Change feed error: {0}")]
    Feed(#[from] SessionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Every suffixed key for one capture was already taken
    #[error("No free archive key for {0}")]
    KeysExhausted(String),
}

impl CaptureError {
    /// Transient feed errors are worth another poll; everything else halts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::Feed(e) if e.is_retryable())
    }
}

/// Result type alias using CaptureError.
pub type CaptureResult<T> = Result<T, CaptureError>;
