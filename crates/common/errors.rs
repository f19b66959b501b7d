use thiserror::Error;

/// Errors shared across the engine's layers (`spec.md` §7). Layer-specific
/// errors (`ledger_trie::TrieError`, `ledger_storage::StoreError`,
/// `ledger_blockchain::{ExecutionError, ChainError}`) wrap or convert into
/// these where they cross a crate boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: crate::U256, need: crate::U256 },
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: crate::U256, got: crate::U256 },
    #[error("transaction gas {gas} below intrinsic floor {intrinsic}")]
    OutOfGasIntrinsic { gas: u64, intrinsic: u64 },
    #[error("invalid block: {0}")]
    InvalidBlock(String),
}
