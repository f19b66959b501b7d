//! Start-up plumbing shared by every subcommand: tracing init and wiring an
//! `Overlay` + `ChainStore` + `State` together from the CLI's `--datadir`/
//! `--network` options (mirrors the shape, not the scale, of the teacher's
//! `cmd/ethrex/initializers.rs::{init_tracing, init_store}`).

use std::path::PathBuf;

use ledger_blockchain::State;
use ledger_storage::Overlay;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::chain_store::ChainStore;
use crate::networks::Network;

pub fn init_tracing(log_level: Level) {
    let filter = EnvFilter::builder().with_default_directive(log_level.into()).from_env_lossy();
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    // A subcommand may run more than once in-process during tests; ignore
    // the "already set" error rather than panicking.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// `datadir == "memory"` selects a purely ephemeral engine, matching the
/// teacher's `--datadir memory` convention: no overlay file, no chain
/// sidecar, nothing survives process exit.
pub fn is_memory_datadir(datadir: &str) -> bool {
    datadir == "memory"
}

pub fn overlay_path(datadir: &str) -> String {
    if datadir.is_empty() {
        String::new()
    } else {
        PathBuf::from(datadir).join("overlay.redb").to_string_lossy().into_owned()
    }
}

pub fn chain_store_path(datadir: &str) -> Option<PathBuf> {
    if is_memory_datadir(datadir) {
        None
    } else {
        Some(PathBuf::from(datadir).join("chain.json"))
    }
}

/// Opens (or creates) the `Overlay`, `ChainStore`, and `State` for
/// `network`/`datadir`, seeding genesis on first run.
pub fn init_engine(datadir: &str, network: &Network, force: bool) -> anyhow::Result<(State, ChainStore, Overlay)> {
    let overlay = if is_memory_datadir(datadir) {
        ledger_storage::open_ephemeral()
    } else {
        ledger_storage::open_db(&overlay_path(datadir), force)?
    };

    let mut chain = ChainStore::open(chain_store_path(datadir))?;
    let config = network.chain_config();

    if chain.current_hash() == ethereum_types::H256::zero() {
        let genesis = network.genesis()?;
        let (state, _root) = State::from_genesis(overlay.clone(), config, &genesis)?;
        chain.seed_genesis(state.previous_block())?;
        tracing::info!(root = ?state.root_hash(), "initialized fresh genesis state");
        return Ok((state, chain, overlay));
    }

    let head = chain
        .info(chain.current_hash())
        .ok_or_else(|| anyhow::anyhow!("chain store head header is missing from its own index"))?;
    let state = State::new(overlay.clone(), config, head);
    Ok((state, chain, overlay))
}
