//! Configuration management for the worklog services.
//!
//! One explicit [`Config`] is built at startup and handed to every component
//! at construction. Nothing reads the environment after that point.

use crate::{is_valid_identifier, CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default analytical table name.
pub const DEFAULT_TABLE_NAME: &str = "work_sessions_bronze";

/// How ingested rows are merged into the analytical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Every archive record becomes a row; duplicates surface as duplicate rows.
    #[default]
    Append,
    /// One row per session id; the most recently captured record wins.
    UpsertById,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::UpsertById => "upsert_by_id",
        }
    }
}

/// What the capture trigger does once a batch exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFailurePolicy {
    /// Stop and return the error to the operator; the batch is redelivered next run.
    #[default]
    Halt,
    /// Log the poison batch at error level and advance past it.
    SkipBatch,
}

/// Main worklog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// SQLite file holding work sessions and the change stream.
    #[serde(default)]
    pub session_store_path: PathBuf,
    /// Root directory of the archive object store.
    #[serde(default)]
    pub archive_store_path: PathBuf,
    /// SQLite file holding the analytical table and its rescue table.
    #[serde(default)]
    pub warehouse_path: PathBuf,
    /// Ingestion checkpoint directory.
    #[serde(default)]
    pub checkpoint_path: PathBuf,
    /// Analytical table name.
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Row merge strategy for the analytical table.
    #[serde(default)]
    pub merge_mode: MergeMode,
    /// Poll interval for continuous ingestion.
    #[serde(default = "default_ingest_interval_secs")]
    pub ingest_interval_secs: u64,
    /// Maximum change-stream events handed to the capture processor at once.
    #[serde(default = "default_capture_batch_size")]
    pub capture_batch_size: usize,
    /// Poll interval when following the change stream.
    #[serde(default = "default_capture_poll_interval_ms")]
    pub capture_poll_interval_ms: u64,
    /// Behavior after a capture batch exhausted its retries.
    #[serde(default)]
    pub capture_failure_policy: CaptureFailurePolicy,
    /// Consecutive failed attempts before the failure policy applies.
    #[serde(default = "default_capture_max_retries")]
    pub capture_max_retries: u32,
    /// Base delay for exponential retry backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Cap for exponential retry backoff.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_ingest_interval_secs() -> u64 {
    60
}

fn default_capture_batch_size() -> usize {
    100
}

fn default_capture_poll_interval_ms() -> u64 {
    1_000
}

fn default_capture_max_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

impl Config {
    /// Create a config with default values rooted at the given paths.
    pub fn with_paths(paths: &Paths) -> Self {
        Self {
            log_level: default_log_level(),
            session_store_path: paths.session_store_file(),
            archive_store_path: paths.archive_dir(),
            warehouse_path: paths.warehouse_file(),
            checkpoint_path: paths.checkpoint_dir(),
            table_name: default_table_name(),
            merge_mode: MergeMode::default(),
            ingest_interval_secs: default_ingest_interval_secs(),
            capture_batch_size: default_capture_batch_size(),
            capture_poll_interval_ms: default_capture_poll_interval_ms(),
            capture_failure_policy: CaptureFailurePolicy::default(),
            capture_max_retries: default_capture_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }

    /// Load configuration for the given paths.
    ///
    /// Reads `config.json` when present, fills unset paths from `paths`,
    /// applies environment overrides and validates the result.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::with_paths(paths)
        };

        config.fill_unset_paths(paths);
        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file without validating it.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the paths' config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Check every field and fail on the first invalid one.
    pub fn validate(&self) -> CoreResult<()> {
        let required_paths = [
            ("session_store_path", &self.session_store_path),
            ("archive_store_path", &self.archive_store_path),
            ("warehouse_path", &self.warehouse_path),
            ("checkpoint_path", &self.checkpoint_path),
        ];
        for (field, path) in required_paths {
            if path.as_os_str().is_empty() {
                return Err(CoreError::Config(format!("{field} must not be empty")));
            }
        }

        if !is_valid_identifier(&self.table_name) {
            return Err(CoreError::Config(format!(
                "table_name '{}' is not a valid identifier",
                self.table_name
            )));
        }
        if self.ingest_interval_secs == 0 {
            return Err(CoreError::Config(
                "ingest_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.capture_batch_size == 0 {
            return Err(CoreError::Config(
                "capture_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.capture_poll_interval_ms == 0 {
            return Err(CoreError::Config(
                "capture_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(CoreError::Config(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }

        Ok(())
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest_interval_secs)
    }

    pub fn capture_poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture_poll_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    fn fill_unset_paths(&mut self, paths: &Paths) {
        if self.session_store_path.as_os_str().is_empty() {
            self.session_store_path = paths.session_store_file();
        }
        if self.archive_store_path.as_os_str().is_empty() {
            self.archive_store_path = paths.archive_dir();
        }
        if self.warehouse_path.as_os_str().is_empty() {
            self.warehouse_path = paths.warehouse_file();
        }
        if self.checkpoint_path.as_os_str().is_empty() {
            self.checkpoint_path = paths.checkpoint_dir();
        }
    }

    /// Override configuration from process environment variables.
    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an environment-like lookup.
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = lookup("WORKLOG_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(path) = lookup("WORKLOG_SESSION_STORE") {
            self.session_store_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("WORKLOG_ARCHIVE_DIR") {
            self.archive_store_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("WORKLOG_WAREHOUSE") {
            self.warehouse_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("WORKLOG_CHECKPOINT_DIR") {
            self.checkpoint_path = PathBuf::from(path);
        }
        if let Some(table) = lookup("WORKLOG_TABLE_NAME") {
            self.table_name = table;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn test_paths() -> Paths {
        Paths::with_base_dir(PathBuf::from("/tmp/worklog-config-test"))
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::with_paths(&test_paths());
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(config.merge_mode, MergeMode::Append);
        assert_eq!(config.capture_failure_policy, CaptureFailurePolicy::Halt);
        assert_eq!(config.ingest_interval(), Duration::from_secs(60));
        assert_eq!(config.backoff_base(), Duration::from_secs(2));
        assert_eq!(config.backoff_max(), Duration::from_secs(300));
        config.validate().unwrap();
    }

    #[test]
    fn test_config_load_from_file_fills_missing_paths() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(
            paths.config_file(),
            r#"{ "log_level": "debug", "merge_mode": "upsert_by_id" }"#,
        )
        .unwrap();

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.merge_mode, MergeMode::UpsertById);
        assert_eq!(config.session_store_path, paths.session_store_file());
        assert_eq!(config.checkpoint_path, paths.checkpoint_dir());
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::with_paths(&paths);
        config.table_name = "bronze_sessions".to_string();
        config.capture_failure_policy = CaptureFailurePolicy::SkipBatch;
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.table_name, "bronze_sessions");
        assert_eq!(loaded.capture_failure_policy, CaptureFailurePolicy::SkipBatch);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.warehouse_path, paths.warehouse_file());
        assert_eq!(config.archive_store_path, paths.archive_dir());
    }

    #[test]
    fn test_invalid_table_name_fails_fast() {
        let mut config = Config::with_paths(&test_paths());
        config.table_name = "bronze; drop table x".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("table_name"));
    }

    #[test]
    fn test_empty_path_fails_fast() {
        let mut config = Config::with_paths(&test_paths());
        config.archive_store_path = PathBuf::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("archive_store_path"));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = Config::with_paths(&test_paths());
        config.ingest_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::with_paths(&test_paths());
        config.capture_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_base_above_max_rejected() {
        let mut config = Config::with_paths(&test_paths());
        config.backoff_base_ms = 10_000;
        config.backoff_max_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_apply_and_ignore_empty_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WORKLOG_LOG_LEVEL", "trace"),
            ("WORKLOG_ARCHIVE_DIR", "/data/archive"),
            ("WORKLOG_TABLE_NAME", "  "),
        ]);
        let mut config = Config::with_paths(&test_paths());
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.archive_store_path, PathBuf::from("/data/archive"));
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
    }

    #[test]
    fn test_unknown_merge_mode_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "merge_mode": "overwrite" }"#).unwrap();

        assert!(matches!(
            Config::load_from_file(&path),
            Err(CoreError::Json(_))
        ));
    }
}
