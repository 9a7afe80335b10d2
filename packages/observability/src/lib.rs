//! Structured logging shared by every worklog process.
//!
//! A process installs the subscriber once with [`init_with_config`] and then
//! logs through plain `tracing` macros. Events land as JSON lines in one
//! append-only file (`~/.worklog/logs/worklog.jsonl` unless configured), so
//! the capture trigger, the ingestion loop and one-shot commands share a
//! single stream:
//!
//! - `tail -f ~/.worklog/logs/worklog.jsonl | jq`
//! - `grep '"level":"ERROR"' ~/.worklog/logs/worklog.jsonl`
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "ingest".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!(batch_id = 3, "Batch ingested");
//! ```

mod file_sink;
mod json_layer;

use std::path::PathBuf;

pub use file_sink::{default_log_path, CentralLogWriter};
pub use json_layer::{JsonLayer, LogEntry};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Defaults to [`default_log_path`].
    pub log_path: Option<PathBuf>,
    /// Mirror events to stderr in compact text form.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "worklog".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Installs the global subscriber. A second call in the same process is a no-op.
pub fn init_with_config(config: LogConfig) {
    file_sink::init_file_subscriber(&config);
}
