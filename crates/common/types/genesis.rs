//! Genesis configuration (`spec.md` §6.5; SPEC_FULL §4.8).
//!
//! The distilled spec only names `genesisState()` (a fixed address→balance
//! map) and `c_genesisDifficulty`. Every real client of this shape expresses
//! genesis as a deserializable document instead — one JSON file per network,
//! the way `ethrex`'s `crates/common/types/genesis.rs` does.

use std::collections::HashMap;

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::constants::genesis_difficulty;

/// Genesis allocation for a single address: starting balance, nonce,
/// contract code, and pre-populated storage slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default)]
    pub code: Vec<u8>,
    #[serde(default)]
    pub storage: HashMap<H256, U256>,
}

impl GenesisAccount {
    pub fn with_balance(balance: U256) -> Self {
        Self { balance, ..Default::default() }
    }
}

/// A chain's genesis document: header fields plus the initial account
/// allocation (`spec.md` §6.5's `genesisState()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genesis {
    pub difficulty: U256,
    pub gas_limit: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub extra_data: Vec<u8>,
    #[serde(default)]
    pub coinbase: Address,
    pub alloc: HashMap<Address, GenesisAccount>,
}

impl Genesis {
    /// Parses a genesis document from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// A small fixed two-account genesis used by tests and the `test`
    /// network preset (`cmd/ledger`'s `--network test`): `spec.md` §8's S6
    /// scenario ("a two-account genesis").
    pub fn dev_preset() -> Self {
        let mut alloc = HashMap::new();
        alloc.insert(
            Address::from_low_u64_be(0xa),
            GenesisAccount::with_balance(U256::from(1_000u64)),
        );
        alloc.insert(
            Address::from_low_u64_be(0xb),
            GenesisAccount::with_balance(U256::zero()),
        );
        Self {
            difficulty: genesis_difficulty(),
            gas_limit: 8_000_000,
            timestamp: 0,
            extra_data: vec![],
            coinbase: Address::zero(),
            alloc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_preset_has_two_accounts() {
        let genesis = Genesis::dev_preset();
        assert_eq!(genesis.alloc.len(), 2);
    }

    #[test]
    fn json_roundtrip() {
        let genesis = Genesis::dev_preset();
        let json = serde_json::to_string(&genesis).unwrap();
        let decoded = Genesis::from_json(&json).unwrap();
        assert_eq!(decoded.alloc.len(), genesis.alloc.len());
    }
}
