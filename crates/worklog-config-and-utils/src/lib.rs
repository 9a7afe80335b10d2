//! Core configuration, paths and utilities shared by the worklog crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{CaptureFailurePolicy, Config, MergeMode, DEFAULT_LOG_LEVEL, DEFAULT_TABLE_NAME};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging_for_service, LOG_STDERR_ENV};
pub use paths::Paths;

/// Returns true if `name` can be used verbatim as a SQL identifier.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, which keeps table and column names
/// safe to interpolate into DDL without quoting rules.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
