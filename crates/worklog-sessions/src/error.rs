//! Work session error types.

use crate::types::SessionId;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Request-level error classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    TransientStore,
    Internal,
}

/// Work session error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Input rejected before touching the store
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No session with this id
    #[error("Work session not found: {0}")]
    NotFound(SessionId),

    /// Session is already completed, or the id is already taken
    #[error("Work session already completed: {0}")]
    Conflict(SessionId),

    /// Store busy, locked or unavailable; safe to retry
    #[error("Session store unavailable: {0}")]
    TransientStore(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Storage(rusqlite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row violates the session invariants
    #[error("Corrupt session record: {0}")]
    Corrupt(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Validation(_) => ErrorKind::Validation,
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::Conflict(_) => ErrorKind::Conflict,
            SessionError::TransientStore(_) => ErrorKind::TransientStore,
            SessionError::Storage(_) | SessionError::Json(_) | SessionError::Corrupt(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStore
    }
}

impl From<rusqlite::Error> for SessionError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                SessionError::TransientStore(err.to_string())
            }
            _ => SessionError::Storage(err),
        }
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;
