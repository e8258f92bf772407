//! File registry: CRUD over [`FileRef`] records, per-stage ID lists, and
//! per-expert replay checkpoints, all persisted through [`Storage`].

use std::collections::HashMap;
use std::sync::Arc;

use epigraph_types::{ExpertId, FileId, FileRef, WriteRecord};

use crate::backend::Storage;
use crate::error::{Result, StorageError};

/// Pending-list key for the HTTP-listing acquisition stage.
pub const DOWNLOAD_FILES_KEY: &[u8] = b"task:download";
/// Pending-list key for the chain-retrieval acquisition stage.
pub const RETRIEVE_FILES_KEY: &[u8] = b"task:retrieve";
/// Pending-list key for the replay stage.
pub const REPLAY_FILES_KEY: &[u8] = b"task:replay";
/// Persisted pagination cursor for the HTTP listing.
pub const DOWNLOAD_PAGE_KEY: &[u8] = b"task:download:page";

/// Storage key of an expert's replay checkpoint.
#[must_use]
pub fn record_key(expert: &ExpertId) -> Vec<u8> {
    format!("task:replay:record:{expert}").into_bytes()
}

/// Registry of file records and stage indices on top of a [`Storage`]
/// engine. All operations are synchronous KV round-trips; callers own any
/// in-memory caching.
#[derive(Clone)]
pub struct FileRegistry {
    storage: Arc<dyn Storage>,
}

impl FileRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load one file record. `Ok(None)` when the file was never saved.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or decode failure.
    pub fn load_file(&self, id: &FileId) -> Result<Option<FileRef>> {
        match self.storage.get(id.as_str().as_bytes()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist one file record under its ID.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or encode failure.
    pub fn save_file(&self, file: &FileRef) -> Result<()> {
        let bytes = serde_json::to_vec(file)?;
        self.storage.put(file.id.as_str().as_bytes(), &bytes)
    }

    /// Load a stage's ID list. A missing list reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or decode failure.
    pub fn load_list(&self, key: &[u8]) -> Result<Vec<FileId>> {
        match self.storage.get(key) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(StorageError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Persist a stage's ID list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or encode failure.
    pub fn save_list(&self, key: &[u8], ids: &[FileId]) -> Result<()> {
        let bytes = serde_json::to_vec(ids)?;
        self.storage.put(key, &bytes)
    }

    /// Load a stage's ID list and every record it names. A record missing
    /// for a listed ID aborts the whole load.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if a listed record is absent, or
    /// another variant on engine failure.
    pub fn load_all(&self, key: &[u8]) -> Result<HashMap<FileId, FileRef>> {
        let mut files = HashMap::new();
        for id in self.load_list(key)? {
            let file = self.load_file(&id)?.ok_or(StorageError::NotFound)?;
            files.insert(id, file);
        }
        Ok(files)
    }

    /// Recompute and persist a stage's ID list from `files`; with
    /// `persist_records` also persist each record, batched with the list
    /// so the index never names a record that failed to land.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or encode failure.
    pub fn save_all(
        &self,
        key: &[u8],
        files: &HashMap<FileId, FileRef>,
        persist_records: bool,
    ) -> Result<()> {
        let ids: Vec<FileId> = files.keys().cloned().collect();
        if !persist_records {
            return self.save_list(key, &ids);
        }

        self.storage.enable_batch();
        let result = (|| {
            for file in files.values() {
                self.save_file(file)?;
            }
            self.save_list(key, &ids)?;
            self.storage.flush()
        })();
        self.storage.disable_batch();
        result
    }

    /// Load an expert's replay checkpoint. `Ok(None)` before first replay.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or decode failure.
    pub fn load_record(&self, expert: &ExpertId) -> Result<Option<WriteRecord>> {
        match self.storage.get(&record_key(expert)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist an expert's replay checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or encode failure.
    pub fn save_record(&self, expert: &ExpertId, record: &WriteRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.storage.put(&record_key(expert), &bytes)
    }

    /// Drop an expert's replay checkpoint. Only the explicit
    /// partition-reset operation calls this.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine failure.
    pub fn delete_record(&self, expert: &ExpertId) -> Result<()> {
        self.storage.delete(&record_key(expert))
    }

    /// Load the persisted listing page cursor, 0 when never advanced.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or decode failure.
    pub fn load_page(&self) -> Result<u64> {
        match self.storage.get(DOWNLOAD_PAGE_KEY) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(StorageError::NotFound) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Persist the listing page cursor.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on engine or encode failure.
    pub fn save_page(&self, page: u64) -> Result<()> {
        let bytes = serde_json::to_vec(&page)?;
        self.storage.put(DOWNLOAD_PAGE_KEY, &bytes)
    }
}
