//! Append-only object store for archive records.
//!
//! Objects are addressed by a flat key. Writes can be made conditional on
//! the key not existing yet, which is how the capture path guarantees it
//! never overwrites an earlier capture.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Prefix of in-flight temp files. Never listed, never valid as a key.
const TEMP_PREFIX: &str = ".tmp-";

/// Precondition for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePrecondition {
    /// Unconditional write.
    None,
    /// Only write if the object does not exist yet.
    DoesNotExist,
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The precondition did not hold; nothing was written.
    PreconditionFailed,
}

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Archive store error type.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    fn io(key: impl Into<String>, source: io::Error) -> Self {
        ArchiveError::Io {
            key: key.into(),
            source,
        }
    }
}

/// Key-addressed object store.
pub trait ArchiveStore: Send + Sync {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, ArchiveError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError>;

    /// All objects, ordered by key.
    fn list(&self) -> Result<Vec<ObjectMeta>, ArchiveError>;

    fn exists(&self, key: &str) -> Result<bool, ArchiveError>;
}

impl<T: ArchiveStore + ?Sized> ArchiveStore for std::sync::Arc<T> {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, ArchiveError> {
        (**self).put(key, bytes, precondition)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError> {
        (**self).get(key)
    }

    fn list(&self) -> Result<Vec<ObjectMeta>, ArchiveError> {
        (**self).list()
    }

    fn exists(&self, key: &str) -> Result<bool, ArchiveError> {
        (**self).exists(key)
    }
}

/// Keys are single path components: non-empty, no separators, no leading dot.
pub fn validate_key(key: &str) -> Result<(), ArchiveError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(ArchiveError::InvalidKey(key.to_string()))
    }
}

/// Directory-backed store. One file per object.
#[derive(Debug, Clone)]
pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    /// Opens the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| ArchiveError::io(root.display().to_string(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_temp(&self, key: &str, bytes: &[u8]) -> Result<PathBuf, ArchiveError> {
        let temp = self
            .root
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&temp).map_err(|e| ArchiveError::io(key, e))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| ArchiveError::io(key, e))?;
        Ok(temp)
    }
}

impl ArchiveStore for FsArchiveStore {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, ArchiveError> {
        validate_key(key)?;
        let target = self.root.join(key);
        let temp = self.write_temp(key, bytes)?;

        let result = match precondition {
            // A hard link fails if the target exists, so a complete object
            // appears atomically or not at all.
            WritePrecondition::DoesNotExist => match std::fs::hard_link(&temp, &target) {
                Ok(()) => Ok(WriteOutcome::Written),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Ok(WriteOutcome::PreconditionFailed)
                }
                Err(e) => Err(ArchiveError::io(key, e)),
            },
            WritePrecondition::None => std::fs::rename(&temp, &target)
                .map(|_| WriteOutcome::Written)
                .map_err(|e| ArchiveError::io(key, e)),
        };

        if temp.exists() {
            let _ = std::fs::remove_file(&temp);
        }
        debug!(key, outcome = ?result.as_ref().ok(), "Archive put");
        result
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError> {
        validate_key(key)?;
        std::fs::read(self.root.join(key)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ArchiveError::NotFound(key.to_string()),
            _ => ArchiveError::io(key, e),
        })
    }

    fn list(&self) -> Result<Vec<ObjectMeta>, ArchiveError> {
        let root = self.root.display().to_string();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(root, e)),
        };

        let mut objects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::io(root.clone(), e))?;
            let Ok(key) = entry.file_name().into_string() else {
                continue;
            };
            if key.starts_with('.') {
                continue;
            }
            let meta = entry.metadata().map_err(|e| ArchiveError::io(key.clone(), e))?;
            if !meta.is_file() {
                continue;
            }
            objects.push(ObjectMeta {
                key,
                size: meta.len(),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn exists(&self, key: &str) -> Result<bool, ArchiveError> {
        validate_key(key)?;
        Ok(self.root.join(key).is_file())
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryArchiveStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
        precondition: WritePrecondition,
    ) -> Result<WriteOutcome, ArchiveError> {
        validate_key(key)?;
        let mut objects = self.objects.lock();
        if precondition == WritePrecondition::DoesNotExist && objects.contains_key(key) {
            return Ok(WriteOutcome::PreconditionFailed);
        }
        objects.insert(key.to_string(), (bytes.to_vec(), Utc::now()));
        Ok(WriteOutcome::Written)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError> {
        self.objects
            .lock()
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| ArchiveError::NotFound(key.to_string()))
    }

    fn list(&self) -> Result<Vec<ObjectMeta>, ArchiveError> {
        Ok(self
            .objects
            .lock()
            .iter()
            .map(|(key, (bytes, modified))| ObjectMeta {
                key: key.clone(),
                size: bytes.len() as u64,
                last_modified: Some(*modified),
            })
            .collect())
    }

    fn exists(&self, key: &str) -> Result<bool, ArchiveError> {
        Ok(self.objects.lock().contains_key(key))
    }
}
