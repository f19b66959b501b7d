use thiserror::Error;

/// Errors surfaced by the authenticated trie.
#[derive(Debug, Error)]
pub enum TrieError {
    #[error("inconsistent internal trie structure")]
    InconsistentTree,
    #[error("trie node not found for hash {0:?}")]
    MissingNode(ethereum_types::H256),
    #[error("rlp decoding failed: {0}")]
    RLPDecode(#[from] ledger_rlp::error::RLPDecodeError),
    #[error("backing store lock poisoned")]
    LockError,
    #[error("trie backend error: {0}")]
    Backend(String),
}
