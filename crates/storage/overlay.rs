//! The `Overlay`: a content-addressed key-value store where writes
//! accumulate as an in-memory journal above a durable (or in-memory)
//! backend. `commit()` flushes the journal; dropping an `Overlay` clone's
//! uncommitted journal without calling `commit()` discards it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ledger_trie::{TrieDB, TrieError};

use crate::backend::StoreBackend;
use crate::error::StoreError;

/// Shared, content-addressed key-value store. Cheap to clone: clones share
/// the backend and the write journal (an `Arc<Mutex<..>>`), matching
/// `spec.md` §5's "copies of `State` share the overlay" requirement.
#[derive(Clone)]
pub struct Overlay {
    backend: Arc<dyn StoreBackend>,
    journal: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl Overlay {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend, journal: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(value) = self.journal.lock().map_err(|_| StoreError::LockError)?.get(key) {
            return Ok(Some(value.clone()));
        }
        self.backend.get(key)
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.journal.lock().map_err(|_| StoreError::LockError)?.insert(key, value);
        Ok(())
    }

    pub fn put_batch(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        let mut journal = self.journal.lock().map_err(|_| StoreError::LockError)?;
        for (k, v) in entries {
            journal.insert(k, v);
        }
        Ok(())
    }

    /// Flushes the journal to the backend. All-or-nothing: a failed flush
    /// leaves the journal intact so the caller can retry or discard.
    pub fn commit(&self) -> Result<(), StoreError> {
        let mut journal = self.journal.lock().map_err(|_| StoreError::LockError)?;
        if journal.is_empty() {
            return Ok(());
        }
        let batch: Vec<(Vec<u8>, Vec<u8>)> = journal.drain().collect();
        self.backend.put_batch(batch)
    }

    /// Discards every journaled write since the last commit.
    pub fn rollback(&self) -> Result<(), StoreError> {
        self.journal.lock().map_err(|_| StoreError::LockError)?.clear();
        Ok(())
    }

    pub fn journal_len(&self) -> Result<usize, StoreError> {
        Ok(self.journal.lock().map_err(|_| StoreError::LockError)?.len())
    }
}

/// The overlay is a `TrieDB`: `ledger-trie` reads nodes through `get` and
/// writes them through `put_batch`, oblivious to the journal/commit split
/// underneath.
impl TrieDB for Overlay {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Overlay::get(self, key).map_err(|e| TrieError::Backend(e.to_string()))
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        Overlay::put_batch(self, key_values).map_err(|e| TrieError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    #[test]
    fn uncommitted_writes_are_visible_locally_but_not_in_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let overlay = Overlay::new(backend.clone());
        overlay.put(b"k".to_vec(), b"v".to_vec()).unwrap();

        assert_eq!(overlay.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.get(b"k").unwrap(), None);
    }

    #[test]
    fn commit_flushes_to_backend() {
        let backend = Arc::new(InMemoryBackend::new());
        let overlay = Overlay::new(backend.clone());
        overlay.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        overlay.commit().unwrap();

        assert_eq!(backend.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(overlay.journal_len().unwrap(), 0);
    }

    #[test]
    fn rollback_discards_uncommitted_writes() {
        let backend = Arc::new(InMemoryBackend::new());
        let overlay = Overlay::new(backend.clone());
        overlay.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        overlay.rollback().unwrap();

        assert_eq!(overlay.get(b"k").unwrap(), None);
        assert_eq!(backend.get(b"k").unwrap(), None);
    }

    #[test]
    fn clones_share_backend_and_journal() {
        let overlay = Overlay::new(Arc::new(InMemoryBackend::new()));
        let clone = overlay.clone();
        clone.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert_eq!(overlay.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
