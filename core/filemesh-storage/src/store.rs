//! The flat storage directory, kept in lockstep with the metadata store.
//!
//! Every file written here goes to a staging name first and is renamed into
//! place once complete, so concurrent readers never see partial content.
//! Replacing a file and its record (and removing both) happens under one
//! write lock, which directory scans also take.

use crate::error::{StorageError, StorageResult};
use crate::hash::{content_id, hash_file};
use crate::metadata::MetadataStore;
use chrono::{DateTime, Utc};
use filemesh_types::{ContentId, FileName, FileRecord, STAGING_PREFIX};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Local file storage for one node.
pub struct FileStore {
    root: PathBuf,
    metadata: MetadataStore,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the storage directory, creating it if needed, with metadata
    /// persisted at `metadata_path`.
    ///
    /// Staging files left behind by an interrupted write are removed.
    pub fn open(
        root: impl Into<PathBuf>,
        metadata_path: impl Into<PathBuf>,
    ) -> StorageResult<Self> {
        let metadata = MetadataStore::open(metadata_path)?;
        Self::with_metadata(root, metadata)
    }

    /// Opens the storage directory with an explicit metadata store.
    pub fn with_metadata(root: impl Into<PathBuf>, metadata: MetadataStore) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let store = Self {
            root,
            metadata,
            write_lock: Mutex::new(()),
        };
        store.remove_stale_staging()?;
        Ok(store)
    }

    /// The storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The metadata store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Full path of a stored file.
    pub fn path_of(&self, name: &FileName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Scans the directory and returns a record for every stored file,
    /// ordered by name.
    ///
    /// Files without a usable record (none, empty identity, or a size that
    /// no longer matches) are hashed now, and all new records from one scan
    /// are persisted together. Records whose file has disappeared are
    /// removed. A file that cannot be read is logged and left out, with its
    /// metadata untouched; only a failure to read the directory itself fails
    /// the scan.
    pub fn list(&self) -> StorageResult<Vec<FileRecord>> {
        let _guard = self.lock()?;
        let on_disk = self.scan_dir()?;

        let mut records = Vec::with_capacity(on_disk.len());
        let mut hashed = Vec::new();
        for (name, size) in &on_disk {
            if let Some(record) = self.current_record(name, *size)? {
                records.push(record);
                continue;
            }
            match self.hash_stored(name) {
                Ok(identity) => hashed.push((name.clone(), identity)),
                // The file may vanish between the scan and the hash.
                Err(StorageError::NotFound(_)) => {}
                Err(StorageError::Io(e)) => {
                    error!("Skipping unreadable file '{}': {}", name, e);
                }
                Err(e) => return Err(e),
            }
        }

        let orphans: Vec<FileName> = self
            .metadata
            .list()?
            .into_iter()
            .map(|r| r.name)
            .filter(|name| !on_disk.contains_key(name))
            .collect();
        if !orphans.is_empty() {
            debug!("Pruning {} records without files", orphans.len());
        }

        if !hashed.is_empty() || !orphans.is_empty() {
            let now = Utc::now();
            let fresh = self.metadata.mutate(|map| {
                for name in &orphans {
                    map.remove(name);
                }
                hashed
                    .into_iter()
                    .map(|(name, (id, len))| upsert(map, &name, id, len, now))
                    .collect::<Vec<_>>()
            })?;
            records.extend(fresh);
            records.sort_by(|a, b| a.name.cmp(&b.name));
        }

        Ok(records)
    }

    /// Number of regular files in the directory, without hashing anything.
    pub fn file_count(&self) -> StorageResult<usize> {
        Ok(self.scan_dir()?.len())
    }

    /// Reads the complete current content of a file.
    pub fn read(&self, name: &FileName) -> StorageResult<Vec<u8>> {
        let path = self.path_of(name);
        self.regular_file_len(name)?;
        fs::read(&path).map_err(|e| not_found_or(e, name))
    }

    /// Current record of a file, hashing it first if needed.
    pub fn record(&self, name: &FileName) -> StorageResult<FileRecord> {
        let _guard = self.lock()?;
        let size = self.regular_file_len(name)?;
        self.ensure_record(name, size)
    }

    /// Writes or overwrites a file and upserts its record.
    ///
    /// If the bytes cannot be written the previous file and record stay as
    /// they were.
    pub fn write(&self, name: &FileName, bytes: &[u8]) -> StorageResult<FileRecord> {
        let id = content_id(bytes);
        let staging = self.stage(bytes).inspect_err(|e| {
            error!("Failed to stage '{}': {}", name, e);
        })?;

        let _guard = match self.lock() {
            Ok(guard) => guard,
            Err(e) => {
                let _ = fs::remove_file(&staging);
                return Err(e);
            }
        };
        if let Err(e) = fs::rename(&staging, self.path_of(name)) {
            error!("Failed to move '{}' into place: {}", name, e);
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }

        let size = bytes.len() as u64;
        let now = Utc::now();
        let result = self.metadata.mutate(|map| {
            let record = match map.get(name) {
                Some(existing) => existing.replaced(id.clone(), size, now),
                None => FileRecord::new(name.clone(), id.clone(), size, now),
            };
            map.insert(name.clone(), record.clone());
            record
        });

        match result {
            Ok(record) => {
                debug!("Stored '{}' ({} bytes, {})", name, size, record.content_id);
                Ok(record)
            }
            Err(e) => {
                // The bytes are in place but the record is stale; make the
                // next scan rehash instead of advertising the old identity.
                warn!("Stored '{}' but could not record it: {}", name, e);
                self.metadata.forget(name)?;
                Err(e)
            }
        }
    }

    /// Removes a file and its record. Returns whether the file existed;
    /// removing an absent file is not an error.
    pub fn delete(&self, name: &FileName) -> StorageResult<bool> {
        let _guard = self.lock()?;
        let existed = match self.regular_file_len(name) {
            Ok(_) => {
                fs::remove_file(self.path_of(name))?;
                true
            }
            Err(StorageError::NotFound(_)) => false,
            Err(e) => return Err(e),
        };
        self.metadata.delete(name)?;
        if existed {
            info!("Deleted '{}'", name);
        }
        Ok(existed)
    }

    /// Local view for reconciliation: name → identity for every file.
    pub fn local_view(&self) -> StorageResult<BTreeMap<FileName, ContentId>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|r| (r.name, r.content_id))
            .collect())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Returns a record whose identity matches the file on disk.
    /// Caller holds the write lock.
    fn ensure_record(&self, name: &FileName, size: u64) -> StorageResult<FileRecord> {
        if let Some(record) = self.current_record(name, size)? {
            return Ok(record);
        }
        let (id, len) = self.hash_stored(name)?;
        let now = Utc::now();
        self.metadata.mutate(|map| upsert(map, name, id, len, now))
    }

    /// The stored record, if it can still be trusted for a file of `size`.
    fn current_record(&self, name: &FileName, size: u64) -> StorageResult<Option<FileRecord>> {
        Ok(self
            .metadata
            .get(name)?
            .filter(|record| !record.needs_hash() && record.size_bytes == size))
    }

    fn hash_stored(&self, name: &FileName) -> StorageResult<(ContentId, u64)> {
        let (id, len) = hash_file(&self.path_of(name)).map_err(|e| not_found_or(e, name))?;
        debug!("Hashed unrecorded file '{}' ({} bytes)", name, len);
        Ok((id, len))
    }

    /// Size of a regular (non-symlink) file, or `NotFound`.
    fn regular_file_len(&self, name: &FileName) -> StorageResult<u64> {
        match fs::symlink_metadata(self.path_of(name)) {
            Ok(meta) if meta.file_type().is_file() => Ok(meta.len()),
            Ok(_) => Err(StorageError::NotFound(name.to_string())),
            Err(e) => Err(not_found_or(e, name)),
        }
    }

    /// Regular files whose names survive sanitization unchanged.
    fn scan_dir(&self) -> StorageResult<BTreeMap<FileName, u64>> {
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(raw) = entry.file_name().into_string() else {
                debug!("Skipping non UTF-8 name {:?}", entry.file_name());
                continue;
            };
            if raw.starts_with(STAGING_PREFIX) {
                continue;
            }
            let Ok(name) = FileName::parse(&raw) else {
                debug!("Skipping unsafe name {:?}", raw);
                continue;
            };
            // DirEntry::file_type does not follow symlinks.
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    error!("Skipping unreadable entry '{}': {}", name, e);
                    continue;
                }
            }
            let len = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    error!("Skipping unreadable file '{}': {}", name, e);
                    continue;
                }
            };
            files.insert(name, len);
        }
        Ok(files)
    }

    /// Writes bytes to a fresh staging file and flushes them to disk.
    fn stage(&self, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self
            .root
            .join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        let result = File::create(&path).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        match result {
            Ok(()) => Ok(path),
            Err(e) => {
                let _ = fs::remove_file(&path);
                Err(e)
            }
        }
    }

    fn remove_stale_staging(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let stale = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if stale {
                warn!("Removing interrupted write {:?}", entry.path());
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

/// Inserts or refreshes the record for a freshly hashed file.
fn upsert(
    map: &mut BTreeMap<FileName, FileRecord>,
    name: &FileName,
    id: ContentId,
    len: u64,
    now: DateTime<Utc>,
) -> FileRecord {
    let record = match map.get(name) {
        Some(existing) if existing.content_id == id && existing.size_bytes == len => {
            existing.clone()
        }
        Some(existing) => existing.replaced(id, len, now),
        None => FileRecord::new(name.clone(), id, len, now),
    };
    map.insert(name.clone(), record.clone());
    record
}

fn not_found_or(e: io::Error, name: &FileName) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io(e)
    }
}
