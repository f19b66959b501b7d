//! Error taxonomy (`spec.md` §7; SPEC_FULL §7): one `thiserror`-derived enum
//! per boundary, each wrapping the layer below it, in the style of the
//! teacher's `ethrex-blockchain::error::ChainError`/`InvalidBlockError`.

use ethereum_types::U256;
use ledger_common::CoreError;
use ledger_crypto::CryptoError;
use ledger_rlp::error::RLPDecodeError;
use ledger_storage::StoreError;
use ledger_trie::TrieError;
use ledger_vm::HostError;
use thiserror::Error;

/// Errors from executing a single transaction or contract operation
/// (`spec.md` §7 `InsufficientBalance`/`InvalidNonce`/`OutOfGasIntrinsic`).
/// Recoverable at the transaction boundary: the caller drops the
/// transaction and its cache checkpoint, state is otherwise untouched.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Trie(#[from] TrieError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Rlp(#[from] RLPDecodeError),
    #[error("transaction signature does not recover to a valid sender")]
    InvalidSignature,
}

/// Errors from playing back or assembling a whole block (`spec.md` §7
/// `InvalidBlock`/`DatabaseFailure`). A block-level error discards the
/// entire block's cache; nothing is ever partially committed.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("parent header not found for block")]
    ParentNotFound,
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error("block has {got} uncles, maximum is {max}")]
    TooManyUncles { max: usize, got: usize },
    #[error("uncle is not a valid ancestor-descendant of the given grandparent")]
    InvalidUncle,
    #[error("state root mismatch: header claims {expected:?}, execution produced {got:?}")]
    StateRootMismatch { expected: ethereum_types::H256, got: ethereum_types::H256 },
    #[error("commitToMine has not been called for the current candidate block")]
    NotReadyToMine,
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from mempool admission (SPEC_FULL §4.9).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("nonce too low: account is at {expected}, got {got}")]
    NonceTooLow { expected: U256, got: U256 },
    #[error("transaction already in the pool")]
    Duplicate,
}
