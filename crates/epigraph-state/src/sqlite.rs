//! `SQLite`-backed implementation of [`Storage`].
//!
//! One `kv` table behind a `Mutex<Connection>`. Batch mode buffers
//! operations in memory (last write per key wins) and flushes them in a
//! single transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::backend::Storage;
use crate::error::{Result, StorageError};

/// Idempotent DDL for the key-value table.
const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
);
";

enum BatchOp {
    Put(Vec<u8>),
    Delete,
}

#[derive(Default)]
struct BatchState {
    enabled: bool,
    ops: HashMap<Vec<u8>, BatchOp>,
}

/// `SQLite`-backed key-value storage.
///
/// Create with [`SqliteStorage::open`] for file-backed persistence or
/// [`SqliteStorage::in_memory`] for tests.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    batch: Mutex<BatchState>,
}

impl SqliteStorage {
    /// Open or create a `SQLite` database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory can't be created, or
    /// [`StorageError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch: Mutex::new(BatchState::default()),
        })
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sqlite`] if the database can't be
    /// initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            batch: Mutex::new(BatchState::default()),
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn lock_batch(&self) -> Result<MutexGuard<'_, BatchState>> {
        self.batch.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()?
        .ok_or(StorageError::NotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        {
            let mut batch = self.lock_batch()?;
            if batch.enabled {
                batch.ops.insert(key.to_vec(), BatchOp::Put(value.to_vec()));
                return Ok(());
            }
        }

        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        {
            let mut batch = self.lock_batch()?;
            if batch.enabled {
                batch.ops.insert(key.to_vec(), BatchOp::Delete);
                return Ok(());
            }
        }

        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn enable_batch(&self) {
        if let Ok(mut batch) = self.lock_batch() {
            batch.enabled = true;
        }
    }

    fn disable_batch(&self) {
        if let Ok(mut batch) = self.lock_batch() {
            batch.enabled = false;
            batch.ops.clear();
        }
    }

    fn flush(&self) -> Result<()> {
        let ops = {
            let mut batch = self.lock_batch()?;
            if !batch.enabled {
                return Ok(());
            }
            std::mem::take(&mut batch.ops)
        };

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        for (key, op) in &ops {
            match op {
                BatchOp::Put(value) => {
                    tx.execute(
                        "INSERT INTO kv (key, value) VALUES (?1, ?2)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                        params![key, value],
                    )?;
                }
                BatchOp::Delete => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_without_batch_is_noop() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.flush().unwrap();
    }

    #[test]
    fn flush_applies_all_ops_in_one_transaction() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.put(b"a", b"1").unwrap();
        storage.enable_batch();
        storage.put(b"b", b"2").unwrap();
        storage.delete(b"a").unwrap();
        storage.flush().unwrap();
        storage.disable_batch();

        assert!(storage.get(b"a").unwrap_err().is_not_found());
        assert_eq!(storage.get(b"b").unwrap(), b"2");
    }

    #[test]
    fn batch_last_write_per_key_wins() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.enable_batch();
        storage.put(b"k", b"first").unwrap();
        storage.put(b"k", b"second").unwrap();
        storage.flush().unwrap();
        storage.disable_batch();
        assert_eq!(storage.get(b"k").unwrap(), b"second");
    }
}
