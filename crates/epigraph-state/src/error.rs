//! Storage error types.

/// Errors produced by [`Storage`](crate::Storage) and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key does not exist. Expected on create-new paths and never
    /// logged as an error by callers.
    #[error("key not found")]
    NotFound,

    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Whether this is the expected missing-key case.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_recognized() {
        assert!(StorageError::NotFound.is_not_found());
        assert!(!StorageError::LockPoisoned.is_not_found());
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StorageError::Io(inner);
        assert!(err.to_string().contains("i/o"));
    }

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(
            StorageError::LockPoisoned.to_string(),
            "storage lock poisoned"
        );
    }
}
