//! Streaming-style checkpoint directory.
//!
//! ```text
//! <checkpoint>/
//!   offsets/<batch>.json   planned keys, written before the merge
//!   commits/<batch>.json   written once the merge transaction committed
//! ```
//!
//! An offset without a matching commit is a pending batch. Keys in a
//! committed offset are consumed and never planned again.

use crate::error::{IngestError, IngestResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const OFFSETS_DIR: &str = "offsets";
const COMMITS_DIR: &str = "commits";

/// Object keys planned for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetEntry {
    pub batch_id: u64,
    pub keys: Vec<String>,
    pub planned_at: String,
}

/// Written after a batch merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEntry {
    pub batch_id: u64,
    pub committed_at: String,
    pub rows: usize,
    pub rescued: usize,
}

pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    /// Directories are created on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn offsets(&self) -> IngestResult<BTreeMap<u64, OffsetEntry>> {
        read_entries(&self.dir.join(OFFSETS_DIR))
    }

    fn commits(&self) -> IngestResult<BTreeMap<u64, CommitEntry>> {
        read_entries(&self.dir.join(COMMITS_DIR))
    }

    /// Highest batch id that has an offset.
    pub fn latest_batch_id(&self) -> IngestResult<Option<u64>> {
        Ok(self.offsets()?.keys().next_back().copied())
    }

    pub fn next_batch_id(&self) -> IngestResult<u64> {
        Ok(self.latest_batch_id()?.map_or(0, |id| id + 1))
    }

    /// Offsets without a commit, oldest first.
    pub fn pending(&self) -> IngestResult<Vec<OffsetEntry>> {
        let commits = self.commits()?;
        Ok(self
            .offsets()?
            .into_values()
            .filter(|offset| !commits.contains_key(&offset.batch_id))
            .collect())
    }

    /// Union of the keys of every committed offset.
    pub fn consumed_keys(&self) -> IngestResult<HashSet<String>> {
        let commits = self.commits()?;
        Ok(self
            .offsets()?
            .into_values()
            .filter(|offset| commits.contains_key(&offset.batch_id))
            .flat_map(|offset| offset.keys)
            .collect())
    }

    pub fn write_offset(&self, entry: &OffsetEntry) -> IngestResult<()> {
        write_entry(&self.dir.join(OFFSETS_DIR), entry.batch_id, entry)?;
        debug!(batch_id = entry.batch_id, keys = entry.keys.len(), "Offset written");
        Ok(())
    }

    pub fn write_commit(&self, entry: &CommitEntry) -> IngestResult<()> {
        write_entry(&self.dir.join(COMMITS_DIR), entry.batch_id, entry)?;
        debug!(batch_id = entry.batch_id, "Commit written");
        Ok(())
    }

    /// Removes the whole directory. Returns false when it was already absent.
    pub fn clear(&self) -> IngestResult<bool> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                info!(path = %self.dir.display(), "Checkpoint cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(IngestError::checkpoint(&self.dir)(e)),
        }
    }
}

/// Reads `<batch>.json` files; temp files and strays are ignored.
fn read_entries<T: DeserializeOwned>(dir: &Path) -> IngestResult<BTreeMap<u64, T>> {
    let mut entries = BTreeMap::new();
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(IngestError::checkpoint(dir)(e)),
    };

    for item in listing {
        let path = item.map_err(IngestError::checkpoint(dir))?.path();
        let Some(batch_id) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_suffix(".json"))
            .and_then(|stem| stem.parse::<u64>().ok())
        else {
            continue;
        };
        let bytes = fs::read(&path).map_err(IngestError::checkpoint(&path))?;
        let entry = serde_json::from_slice(&bytes)
            .map_err(|source| IngestError::CorruptCheckpoint { path, source })?;
        entries.insert(batch_id, entry);
    }
    Ok(entries)
}

fn write_entry<T: Serialize>(dir: &Path, batch_id: u64, entry: &T) -> IngestResult<()> {
    let target = dir.join(format!("{batch_id}.json"));
    let temp = dir.join(format!(".{batch_id}.json.tmp"));
    let bytes = serde_json::to_vec_pretty(entry)?;

    fs::create_dir_all(dir).map_err(IngestError::checkpoint(dir))?;
    fs::write(&temp, bytes).map_err(IngestError::checkpoint(&temp))?;
    fs::rename(&temp, &target).map_err(IngestError::checkpoint(&target))?;
    Ok(())
}
