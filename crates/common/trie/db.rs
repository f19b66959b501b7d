use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::TrieError;

/// Content-addressed backing store the trie reads nodes from and writes
/// nodes to. Keys are node hashes; values are RLP-encoded node bodies.
///
/// This is the trie's view of the engine's `Overlay` (`ledger-storage`) —
/// the trie never knows about the overlay's journal/commit semantics, only
/// about get/put.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError>;
    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError>;
}

/// Plain in-memory `TrieDB`, handy for tests and for the ephemeral per-call
/// storage tries the VM host builds while executing a transaction.
#[derive(Clone, Default)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self.inner.lock().map_err(|_| TrieError::LockError)?.get(key).cloned())
    }

    fn put_batch(&self, key_values: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock().map_err(|_| TrieError::LockError)?;
        for (k, v) in key_values {
            db.insert(k, v);
        }
        Ok(())
    }
}
