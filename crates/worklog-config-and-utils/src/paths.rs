//! On-disk layout under the worklog base directory.
//!
//! ```text
//! ~/.worklog/
//!   config.json
//!   sessions.sqlite               work sessions + change stream
//!   archive/                      immutable per-event JSON objects
//!   warehouse.sqlite              analytical table + rescue table
//!   checkpoints/work_sessions/    ingestion offsets and commits
//!   logs/worklog.jsonl
//! ```

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".worklog";

#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Rooted at `~/.worklog`.
    pub fn new() -> CoreResult<Self> {
        dirs::home_dir()
            .map(|home| Self::with_base_dir(home.join(BASE_DIR_NAME)))
            .ok_or_else(|| CoreError::Path("no home directory for this user".into()))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn session_store_file(&self) -> PathBuf {
        self.base_dir.join("sessions.sqlite")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.base_dir.join("archive")
    }

    pub fn warehouse_file(&self) -> PathBuf {
        self.base_dir.join("warehouse.sqlite")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.base_dir.join("checkpoints").join("work_sessions")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("worklog.jsonl")
    }

    /// Creates the base, archive and log directories.
    ///
    /// Checkpoint and warehouse locations are created by their owners on
    /// first write.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        for dir in [self.base_dir.clone(), self.archive_dir(), self.logs_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-worklog");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.session_store_file(), base.join("sessions.sqlite"));
        assert_eq!(paths.archive_dir(), base.join("archive"));
        assert_eq!(paths.warehouse_file(), base.join("warehouse.sqlite"));
        assert_eq!(
            paths.checkpoint_dir(),
            base.join("checkpoints/work_sessions")
        );
        assert_eq!(paths.logs_dir(), base.join("logs"));
        assert_eq!(paths.log_file(), base.join("logs/worklog.jsonl"));
    }

    #[test]
    fn test_ensure_dirs_creates_layout() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));

        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().is_dir());
        assert!(paths.archive_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
