use ledger_rlp::error::RLPDecodeError;
use ledger_trie::TrieError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("overlay backend I/O error: {0}")]
    Io(String),
    #[error("redb error: {0}")]
    Redb(String),
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error(transparent)]
    Trie(#[from] TrieError),
    #[error("overlay write journal lock poisoned")]
    LockError,
}
