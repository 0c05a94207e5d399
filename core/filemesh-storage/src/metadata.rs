//! Durable filename → record map.
//!
//! The whole map lives in memory and is persisted as one JSON object keyed
//! by filename. Every mutation rewrites the file through a temporary file
//! and a rename, so a crash leaves either the old or the new map on disk.
//! The in-memory map is only replaced after the new map was persisted.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use filemesh_types::{ContentId, FileName, FileRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// On-disk shape of one record.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    #[serde(default)]
    hash: ContentId,
    size: u64,
    uploaded: DateTime<Utc>,
    modified: DateTime<Utc>,
}

type RecordMap = BTreeMap<FileName, FileRecord>;

/// Persistent metadata store backed by a JSON file.
pub struct MetadataStore {
    path: Option<PathBuf>,
    records: Mutex<RecordMap>,
}

impl MetadataStore {
    /// Opens (or starts) a metadata store at the given path.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first mutation. A file that exists but cannot be parsed is an error.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(bytes) => decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No metadata at {}, starting empty", path.display());
                RecordMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} metadata records from {}", records.len(), path.display());
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    /// Opens a store that is never persisted (for testing).
    pub fn open_in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(RecordMap::new()),
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up the record for a name.
    pub fn get(&self, name: &FileName) -> StorageResult<Option<FileRecord>> {
        let records = self.records.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(name).cloned())
    }

    /// Inserts or replaces a record.
    pub fn put(&self, record: FileRecord) -> StorageResult<()> {
        self.mutate(|records| {
            records.insert(record.name.clone(), record);
        })
    }

    /// Removes a record. Returns whether one existed.
    pub fn delete(&self, name: &FileName) -> StorageResult<bool> {
        if self.get(name)?.is_none() {
            return Ok(false);
        }
        self.mutate(|records| records.remove(name).is_some())
    }

    /// All records, ordered by name.
    pub fn list(&self) -> StorageResult<Vec<FileRecord>> {
        let records = self.records.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.values().cloned().collect())
    }

    /// Number of records.
    pub fn len(&self) -> StorageResult<usize> {
        let records = self.records.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.len())
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Applies a read-modify-write to the map under the store lock.
    ///
    /// The closure runs on a copy; the copy is persisted and only then
    /// becomes the live map. On a persistence error nothing changes.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut RecordMap) -> R) -> StorageResult<R> {
        let mut records = self.records.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut next = records.clone();
        let out = f(&mut next);
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *records = next;
        Ok(out)
    }

    /// Drops a record from memory only, without touching the backing file.
    ///
    /// Used when the bytes on disk changed but the new record could not be
    /// persisted: the next scan then rehashes the file instead of trusting
    /// the stale identity.
    pub(crate) fn forget(&self, name: &FileName) -> StorageResult<()> {
        let mut records = self.records.lock().map_err(|_| StorageError::LockPoisoned)?;
        records.remove(name);
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> StorageResult<RecordMap> {
    let raw: BTreeMap<String, PersistedRecord> = serde_json::from_slice(bytes)?;
    let mut records = RecordMap::new();
    for (key, entry) in raw {
        let name = FileName::parse(&key)?;
        records.insert(
            name.clone(),
            FileRecord {
                name,
                content_id: entry.hash,
                size_bytes: entry.size,
                uploaded_at: entry.uploaded,
                modified_at: entry.modified,
            },
        );
    }
    Ok(records)
}

fn encode(records: &RecordMap) -> StorageResult<Vec<u8>> {
    let raw: BTreeMap<&str, PersistedRecord> = records
        .values()
        .map(|r| {
            (
                r.name.as_str(),
                PersistedRecord {
                    hash: r.content_id.clone(),
                    size: r.size_bytes,
                    uploaded: r.uploaded_at,
                    modified: r.modified_at,
                },
            )
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&raw)?)
}

/// Writes the map next to `path` and renames it into place.
fn persist(path: &Path, records: &RecordMap) -> StorageResult<()> {
    let bytes = encode(records)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}
