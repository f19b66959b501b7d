//! Pluggable backends for the [`crate::Overlay`]: an ephemeral in-memory map
//! for tests, and a `redb`-backed durable store for everything else.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use redb::{Database, TableDefinition};

use crate::error::StoreError;

const NODES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("overlay_nodes");

/// The durable (or ephemeral) key-value surface the `Overlay`'s journal
/// flushes into on `commit`.
pub trait StoreBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError>;
}

/// Plain in-memory backend. No persistence across process restarts.
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for InMemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| StoreError::LockError)?
            .get(key)
            .cloned())
    }

    fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|_| StoreError::LockError)?;
        for (k, v) in entries {
            map.insert(k, v);
        }
        Ok(())
    }
}

/// Durable backend over `redb`, a single-file embedded key-value store.
/// Commits are fsync'd transactions — crash-safe at the granularity §6.1
/// requires.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::Redb(e.to_string()))?;
        // Ensure the table exists even if nothing has been written yet.
        let write_txn = db.begin_write().map_err(|e| StoreError::Redb(e.to_string()))?;
        {
            write_txn
                .open_table(NODES_TABLE)
                .map_err(|e| StoreError::Redb(e.to_string()))?;
        }
        write_txn.commit().map_err(|e| StoreError::Redb(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(|e| StoreError::Redb(e.to_string()))?;
        let table = read_txn
            .open_table(NODES_TABLE)
            .map_err(|e| StoreError::Redb(e.to_string()))?;
        let value = table.get(key).map_err(|e| StoreError::Redb(e.to_string()))?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(|e| StoreError::Redb(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(NODES_TABLE)
                .map_err(|e| StoreError::Redb(e.to_string()))?;
            for (key, value) in &entries {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(|e| StoreError::Redb(e.to_string()))?;
            }
        }
        write_txn.commit().map_err(|e| StoreError::Redb(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_roundtrip() {
        let backend = InMemoryBackend::new();
        backend.put_batch(vec![(b"k".to_vec(), b"v".to_vec())]).unwrap();
        assert_eq!(backend.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.get(b"missing").unwrap(), None);
    }

    #[test]
    fn redb_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put_batch(vec![(b"k".to_vec(), b"v".to_vec())]).unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(backend.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
