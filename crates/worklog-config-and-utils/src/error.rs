use thiserror::Error;

/// Failures while resolving paths or loading configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting is missing or out of range; the message names it.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot resolve path: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
