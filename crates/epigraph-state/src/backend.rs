//! Storage capability trait.
//!
//! [`Storage`] is the flat byte-key/byte-value contract every persisted
//! piece of state goes through. Two engines implement it:
//! [`SqliteStorage`](crate::SqliteStorage) and
//! [`MemoryStorage`](crate::MemoryStorage).

use crate::error::Result;

/// Flat key-value store with an optional buffered batch mode.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    /// Return the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound)
    /// when the key does not exist, or another variant on engine failure.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Store `value` under `key`, overwriting any previous value.
    ///
    /// With batch mode enabled the write is buffered until
    /// [`flush`](Storage::flush).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`](crate::StorageError) on engine failure.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    ///
    /// With batch mode enabled the delete is buffered until
    /// [`flush`](Storage::flush).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`](crate::StorageError) on engine failure.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Start buffering writes. Buffered operations are not visible to
    /// [`get`](Storage::get) until flushed.
    fn enable_batch(&self);

    /// Stop buffering and discard any pending operations.
    fn disable_batch(&self);

    /// Apply all buffered operations as one atomic update.
    ///
    /// A no-op when batch mode is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`](crate::StorageError) on engine failure.
    fn flush(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::sqlite::SqliteStorage;

    /// Verify the trait is object-safe (can be used as `dyn Storage`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn Storage) {}
    }

    /// Conformance suite run against every engine.
    fn exercise(storage: &dyn Storage) {
        // roundtrip
        storage.put(b"k1", b"v1").unwrap();
        assert_eq!(storage.get(b"k1").unwrap(), b"v1");

        // overwrite
        storage.put(b"k1", b"v2").unwrap();
        assert_eq!(storage.get(b"k1").unwrap(), b"v2");

        // missing key
        assert!(storage.get(b"absent").unwrap_err().is_not_found());

        // delete, idempotent
        storage.delete(b"k1").unwrap();
        assert!(storage.get(b"k1").unwrap_err().is_not_found());
        storage.delete(b"k1").unwrap();

        // batch writes are invisible until flush, then land together
        storage.put(b"seen", b"old").unwrap();
        storage.enable_batch();
        storage.put(b"seen", b"new").unwrap();
        storage.put(b"added", b"yes").unwrap();
        storage.delete(b"seen").unwrap();
        assert_eq!(storage.get(b"seen").unwrap(), b"old");
        assert!(storage.get(b"added").unwrap_err().is_not_found());
        storage.flush().unwrap();
        storage.disable_batch();
        assert!(storage.get(b"seen").unwrap_err().is_not_found());
        assert_eq!(storage.get(b"added").unwrap(), b"yes");

        // disabling batch discards pending operations
        storage.enable_batch();
        storage.put(b"dropped", b"x").unwrap();
        storage.disable_batch();
        storage.flush().unwrap();
        assert!(storage.get(b"dropped").unwrap_err().is_not_found());
    }

    #[test]
    fn memory_engine_conforms() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn sqlite_engine_conforms() {
        exercise(&SqliteStorage::in_memory().unwrap());
    }

    #[test]
    fn sqlite_engine_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("epigraph.db");
        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.put(b"durable", b"value").unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.get(b"durable").unwrap(), b"value");
    }
}
