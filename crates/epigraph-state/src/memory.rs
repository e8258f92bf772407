//! In-memory implementation of [`Storage`].
//!
//! Backs tests and ephemeral runs. Batch mode buffers operations exactly
//! like the disk engine so the capability contract holds for both.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::backend::Storage;
use crate::error::{Result, StorageError};

enum BatchOp {
    Put(Vec<u8>),
    Delete,
}

#[derive(Default)]
struct BatchState {
    enabled: bool,
    ops: HashMap<Vec<u8>, BatchOp>,
}

/// Map-backed key-value storage.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    batch: Mutex<BatchState>,
}

impl MemoryStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_data(&self) -> Result<MutexGuard<'_, HashMap<Vec<u8>, Vec<u8>>>> {
        self.data.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn lock_batch(&self) -> Result<MutexGuard<'_, BatchState>> {
        self.batch.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lock_data()?
            .get(key)
            .cloned()
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
        self.lock_data()?.insert(key.to_vec(), value.to_vec());
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
        self.lock_data()?.remove(key);
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

        let mut data = self.lock_data()?;
        for (key, op) in ops {
            match op {
                BatchOp::Put(value) => {
                    data.insert(key, value);
                }
                BatchOp::Delete => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_writers_land_all_keys() {
        use std::sync::Arc;

        let storage = Arc::new(MemoryStorage::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let st = storage.clone();
                std::thread::spawn(move || {
                    let key = format!("key-{i}");
                    st.put(key.as_bytes(), b"v").unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8 {
            assert!(storage.get(format!("key-{i}").as_bytes()).is_ok());
        }
    }
}
