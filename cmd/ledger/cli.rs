//! Command-line surface driving the state engine end-to-end: seed a
//! genesis, play back blocks, assemble and mine a candidate, and inspect
//! accounts. Shaped after the teacher's `cmd/ethrex::cli::{CLI, Options,
//! Subcommand}` split — global node options flattened alongside a
//! subcommand enum — scaled down to this engine's surface (no P2P, no RPC
//! server: `spec.md` §1 scopes those out).

use std::fs;
use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand as ClapSubcommand};
use ethereum_types::{Address, H256};
use ledger_blockchain::ChainView;
use ledger_common::Block;
use ledger_rlp::decode::RLPDecode;
use tracing::{info, warn, Level};

use crate::initializers::{init_engine, init_tracing};
use crate::networks::Network;
use crate::DEFAULT_DATADIR;

pub const VERSION_STRING: &str = env!("CARGO_PKG_VERSION");

#[derive(ClapParser)]
#[command(name = "ledger", version = VERSION_STRING, about = "Ledger state engine CLI")]
pub struct Cli {
    #[command(flatten)]
    pub opts: Options,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapParser)]
pub struct Options {
    #[arg(
        long = "datadir",
        default_value = DEFAULT_DATADIR,
        value_name = "DATADIR",
        help = "Directory holding the overlay database and chain index. The literal value `memory` selects a purely in-memory, non-persistent engine."
    )]
    pub datadir: String,
    #[arg(
        long = "network",
        default_value = "test",
        value_name = "NETWORK_OR_GENESIS_PATH",
        help = "`mainnet-like`, `test`, or a path to a genesis JSON document"
    )]
    pub network: String,
    #[arg(long = "log-level", default_value_t = Level::INFO, value_name = "LEVEL")]
    pub log_level: Level,
}

#[derive(ClapSubcommand)]
pub enum Command {
    #[command(name = "removedb", about = "Delete the overlay database and chain index")]
    RemoveDb,
    #[command(name = "import", about = "Play back RLP-encoded blocks into the state engine")]
    Import {
        #[arg(required = true, value_name = "FILE", num_args = 1.., help = "One or more files, each a single RLP-encoded [header, transactions, uncles] block")]
        files: Vec<PathBuf>,
    },
    #[command(name = "mine", about = "Assemble the current pending transactions into a candidate and search for a valid nonce")]
    Mine {
        #[arg(long = "coinbase", value_name = "ADDRESS", help = "Address credited with the block reward")]
        coinbase: Option<String>,
        #[arg(long = "timeout-ms", default_value_t = 2_000, value_name = "MILLISECONDS", help = "Upper bound on a single search attempt; retried until it succeeds or --attempts is exhausted")]
        timeout_ms: u64,
        #[arg(long = "attempts", default_value_t = 30, value_name = "N")]
        attempts: u32,
        #[arg(long = "out", value_name = "FILE", help = "Where to write the sealed block's RLP bytes")]
        out: Option<PathBuf>,
    },
    #[command(name = "account", about = "Print an account's balance, nonce, and code hash at the current head")]
    Account {
        #[arg(value_name = "ADDRESS")]
        address: String,
        #[arg(long = "storage-key", value_name = "HEX_KEY", help = "Also print the value stored under this 32-byte storage key")]
        storage_key: Option<String>,
    },
    #[command(name = "root", about = "Print the world-state root at the current head")]
    Root,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        init_tracing(self.opts.log_level);
        self.command.run(&self.opts)
    }
}

impl Command {
    pub fn run(self, opts: &Options) -> anyhow::Result<()> {
        match self {
            Command::RemoveDb => remove_db(&opts.datadir),
            Command::Import { files } => import_blocks(opts, &files),
            Command::Mine { coinbase, timeout_ms, attempts, out } => {
                mine_block(opts, coinbase.as_deref(), timeout_ms, attempts, out.as_deref())
            }
            Command::Account { address, storage_key } => {
                print_account(opts, &address, storage_key.as_deref())
            }
            Command::Root => print_root(opts),
        }
    }
}

fn remove_db(datadir: &str) -> anyhow::Result<()> {
    if crate::initializers::is_memory_datadir(datadir) {
        return Ok(());
    }
    let path = PathBuf::from(datadir);
    if path.exists() {
        fs::remove_dir_all(&path)?;
        info!(?path, "removed database");
    } else {
        warn!(?path, "nothing to remove");
    }
    Ok(())
}

fn parse_address(value: &str) -> anyhow::Result<Address> {
    let bytes = hex::decode(value.trim_start_matches("0x"))?;
    if bytes.len() != 20 {
        anyhow::bail!("expected a 20-byte address, got {} bytes", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

fn parse_h256(value: &str) -> anyhow::Result<H256> {
    let bytes = hex::decode(value.trim_start_matches("0x"))?;
    if bytes.len() != 32 {
        anyhow::bail!("expected a 32-byte value, got {} bytes", bytes.len());
    }
    Ok(H256::from_slice(&bytes))
}

fn import_blocks(opts: &Options, files: &[PathBuf]) -> anyhow::Result<()> {
    let network = Network::parse(&opts.network);
    let (state, mut chain, _overlay) = init_engine(&opts.datadir, &network, false)?;

    let mut sorted = files.to_vec();
    sorted.sort();
    for path in sorted {
        let bytes = fs::read(&path)?;
        let block = Block::decode(&bytes).map_err(|e| anyhow::anyhow!("decoding {path:?}: {e}"))?;
        let parent = chain
            .info(block.header.parent_hash)
            .ok_or_else(|| anyhow::anyhow!("{path:?}: parent block not found in chain index"))?;
        let grand_parent = chain.info(parent.parent_hash);

        let added_difficulty =
            state.playback(&bytes, &parent, grand_parent.as_ref(), true, &chain)?;
        chain.advance_head(block.header.clone(), added_difficulty)?;
        info!(?path, number = block.header.number, root = ?state.root_hash(), "imported block");
    }
    Ok(())
}

fn mine_block(
    opts: &Options,
    coinbase: Option<&str>,
    timeout_ms: u64,
    attempts: u32,
    out: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let network = Network::parse(&opts.network);
    let (state, chain, _overlay) = init_engine(&opts.datadir, &network, false)?;

    if let Some(coinbase) = coinbase {
        state.set_coinbase(parse_address(coinbase)?);
    }

    state.commit_to_mine(&chain)?;
    info!(candidate = ?state.current_block().number, "candidate block assembled, searching for a valid nonce");

    let mut info_result = None;
    for attempt in 0..attempts {
        let result = state.mine(timeout_ms)?;
        let completed = result.completed;
        info_result = Some(result);
        if completed {
            info!(attempt, "mining succeeded");
            break;
        }
    }
    let mine_info = info_result.ok_or_else(|| anyhow::anyhow!("no mining attempts were made"))?;
    if !mine_info.completed {
        anyhow::bail!("mining did not complete within {attempts} attempts of {timeout_ms}ms each");
    }

    let sealed = state.block_data().ok_or_else(|| anyhow::anyhow!("mine reported success but left no sealed bytes"))?;
    match out {
        Some(path) => {
            fs::write(path, &sealed)?;
            info!(?path, bytes = sealed.len(), "wrote sealed block");
        }
        None => println!("{}", hex::encode(&sealed)),
    }
    Ok(())
}

fn print_account(opts: &Options, address: &str, storage_key: Option<&str>) -> anyhow::Result<()> {
    let network = Network::parse(&opts.network);
    let (state, _chain, _overlay) = init_engine(&opts.datadir, &network, false)?;
    let address = parse_address(address)?;

    let balance = state.balance(&address)?;
    let nonce = state.transactions_from(&address)?;
    let in_use = state.address_in_use(&address)?;
    println!("address   {address:#x}");
    println!("in_use    {in_use}");
    println!("balance   {balance}");
    println!("nonce     {nonce}");

    if let Some(key) = storage_key {
        let key = parse_h256(key)?;
        let value = state.storage(&address, &key)?;
        println!("storage[{key:#x}] = {value:#x}");
    }
    Ok(())
}

fn print_root(opts: &Options) -> anyhow::Result<()> {
    let network = Network::parse(&opts.network);
    let (state, _chain, _overlay) = init_engine(&opts.datadir, &network, false)?;
    println!("{:#x}", state.root_hash());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address_rejects_wrong_length() {
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn parse_address_accepts_well_formed_hex() {
        let addr = parse_address("0x000000000000000000000000000000000000aa").unwrap();
        assert_eq!(addr, Address::from_low_u64_be(0xaa));
    }
}
