//! # ledger-common
//!
//! Shared primitive types for the ledger state engine: the account record,
//! block header/body, transaction, genesis configuration, and the gas/
//! reward/uncle constants named in `spec.md` §6.6.

pub mod constants;
pub mod errors;
pub mod types;

pub use ethereum_types::{Address, H256, U256};

pub use errors::CoreError;
pub use types::account::Account;
pub use types::block::{transactions_root, uncles_hash, Block, BlockHeader};
pub use types::genesis::{Genesis, GenesisAccount};
pub use types::transaction::{To, Transaction, TxSignature};
