//! # ledger-blockchain
//!
//! The state core, block pipeline, and mempool described in `spec.md` §4:
//! `AccountCache` (§4.1), the commit algorithm (§4.2), transaction execution
//! (§4.3), contract `create`/`call` (§4.4), block playback (§4.5), candidate
//! block assembly (§4.6), and chain synchronization (§4.7). Mirrors the
//! teacher's (`ethrex`) split of `crates/blockchain/{blockchain.rs,mempool.rs,
//! error.rs,payload.rs}` into this crate's `state`/`mempool`/`error`/
//! `account_cache` modules.

pub mod account_cache;
pub mod chain_view;
pub mod config;
pub mod error;
pub mod mempool;
pub mod state;

pub use account_cache::{AccountCache, CacheHost};
pub use chain_view::{BlockDetails, ChainView};
pub use config::{ChainConfig, EngineConfig};
pub use error::{ChainError, ExecutionError, MempoolError};
pub use mempool::Mempool;
pub use state::State;
