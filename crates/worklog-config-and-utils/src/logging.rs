//! Logging bootstrap for worklog processes.
//!
//! Every command appends to the observability crate's central JSONL file;
//! the service name tells `worklog`, `capture` and `ingest` lines apart.

use observability::LogConfig;
use std::path::PathBuf;

/// Set to `0`, `false` or `no` to silence the stderr copy of the log.
pub const LOG_STDERR_ENV: &str = "WORKLOG_LOG_STDERR";

/// Installs the global subscriber for `service_name`.
///
/// `level` is the default filter; `RUST_LOG` still wins when set.
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: stderr_enabled(std::env::var(LOG_STDERR_ENV).ok().as_deref()),
    });
}

fn stderr_enabled(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(raw) => !matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_copy_is_on_unless_disabled() {
        assert!(stderr_enabled(None));
        assert!(stderr_enabled(Some("1")));
        assert!(stderr_enabled(Some("yes")));
        assert!(!stderr_enabled(Some("0")));
        assert!(!stderr_enabled(Some(" False ")));
        assert!(!stderr_enabled(Some("off")));
    }
}
