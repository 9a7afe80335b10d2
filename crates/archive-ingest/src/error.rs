//! Ingestion error types.

use session_capture::ArchiveError;
use std::path::PathBuf;
use thiserror::Error;

/// Ingestion error type.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Listing or reading the archive failed
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] rusqlite::Error),

    #[error("Checkpoint IO error at {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file exists but cannot be parsed
    #[error("Corrupt checkpoint file {path}: {source}")]
    CorruptCheckpoint {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),
}

impl IngestError {
    pub(crate) fn checkpoint(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| IngestError::Checkpoint { path, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| IngestError::Io { path, source }
    }
}

/// Result type alias using IngestError.
pub type IngestResult<T> = Result<T, IngestError>;
