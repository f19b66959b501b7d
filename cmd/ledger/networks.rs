//! Named genesis/chain-config presets, mirroring the teacher's
//! `cmd/ethrex/networks.rs` (one preset per known network) but scaled down
//! to the two presets this engine ships without a bundled genesis file set:
//! `mainnet-like` (real gas schedule, real difficulty) and `test` (same gas
//! schedule, trivial difficulty, two funded accounts — `spec.md` §8 S6's
//! "two-account genesis"). `--network <path>` loads an arbitrary genesis
//! JSON document instead (`spec.md` §6.1 "genesis document").

use std::path::Path;

use ledger_blockchain::ChainConfig;
use ledger_common::Genesis;

#[derive(Debug, Clone)]
pub enum Network {
    MainnetLike,
    Test,
    File(String),
}

impl Network {
    pub fn parse(value: &str) -> Self {
        match value {
            "mainnet-like" | "mainnet" => Network::MainnetLike,
            "test" => Network::Test,
            path => Network::File(path.to_string()),
        }
    }

    pub fn genesis(&self) -> anyhow::Result<Genesis> {
        match self {
            Network::MainnetLike => Ok(mainnet_like_genesis()),
            Network::Test => Ok(Genesis::dev_preset()),
            Network::File(path) => {
                let contents = std::fs::read_to_string(Path::new(path))
                    .map_err(|e| anyhow::anyhow!("reading genesis file {path}: {e}"))?;
                Genesis::from_json(&contents)
                    .map_err(|e| anyhow::anyhow!("parsing genesis file {path}: {e}"))
            }
        }
    }

    pub fn chain_config(&self) -> ChainConfig {
        match self {
            Network::MainnetLike => ChainConfig::mainnet_like(),
            Network::Test => ChainConfig::test_preset(),
            // A custom genesis still runs the real gas schedule; only the
            // `test` preset trades that away for a trivial difficulty.
            Network::File(_) => ChainConfig::mainnet_like(),
        }
    }
}

/// A fixed one-account mainnet-like genesis: no real client ships a
/// zero-account genesis, but the real mainnet allocation is out of scope
/// here (`spec.md` §1's "the published genesis state root" is a property
/// to test against, not a dataset this repo carries).
fn mainnet_like_genesis() -> Genesis {
    use ethereum_types::{Address, U256};
    use ledger_common::GenesisAccount;
    use std::collections::HashMap;

    let mut alloc = HashMap::new();
    alloc.insert(Address::zero(), GenesisAccount::with_balance(U256::zero()));
    Genesis {
        difficulty: ledger_common::constants::genesis_difficulty(),
        gas_limit: 8_000_000,
        timestamp: 0,
        extra_data: Vec::new(),
        coinbase: Address::zero(),
        alloc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_named_presets() {
        assert!(matches!(Network::parse("mainnet-like"), Network::MainnetLike));
        assert!(matches!(Network::parse("test"), Network::Test));
        assert!(matches!(Network::parse("./genesis.json"), Network::File(_)));
    }

    #[test]
    fn test_preset_has_trivial_difficulty() {
        assert_eq!(Network::Test.chain_config().genesis_difficulty, ethereum_types::U256::one());
    }
}
