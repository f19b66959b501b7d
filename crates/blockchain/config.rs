//! `ChainConfig`: the gas/reward/uncle constants injected at `State`
//! construction rather than read from process-wide globals (`spec.md` §9
//! "Global-ish constants ... belong in a single immutable configuration
//! value"). `EngineConfig` is the ambient companion (SPEC_FULL §11) that
//! also carries the overlay path, mirroring the teacher's
//! `cmd/ethrex/networks.rs` named-preset pattern (`mainnet-like` vs `test`).

use ethereum_types::U256;
use ledger_common::constants;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub data_gas_per_byte: u64,
    pub call_base_gas: u64,
    pub creation_base_gas: u64,
    pub block_reward: U256,
    pub max_uncles: usize,
    pub max_uncle_depth: u64,
    pub genesis_difficulty: U256,
}

impl ChainConfig {
    /// Mirrors `spec.md` §6.6's constants as the mainnet-like default.
    pub fn mainnet_like() -> Self {
        Self {
            data_gas_per_byte: constants::DATA_GAS_PER_BYTE,
            call_base_gas: constants::CALL_BASE_GAS,
            creation_base_gas: constants::CREATION_BASE_GAS,
            block_reward: constants::block_reward(),
            max_uncles: constants::MAX_UNCLES,
            max_uncle_depth: constants::MAX_UNCLE_DEPTH,
            genesis_difficulty: constants::genesis_difficulty(),
        }
    }

    /// Trivial difficulty and identical gas schedule, for fast local tests
    /// and the `cmd/ledger --network test` preset.
    pub fn test_preset() -> Self {
        Self { genesis_difficulty: U256::from(1u64), ..Self::mainnet_like() }
    }

    pub fn intrinsic_gas(&self, data_len: usize, is_creation: bool) -> u64 {
        let base = if is_creation { self.creation_base_gas } else { self.call_base_gas };
        self.data_gas_per_byte * data_len as u64 + base
    }

    pub fn uncle_reward(&self, depth: u64) -> U256 {
        if depth == 0 || depth > self.max_uncle_depth {
            return U256::zero();
        }
        self.block_reward * U256::from(8 - depth) / U256::from(8u64)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::mainnet_like()
    }
}

/// Node-level configuration: where the overlay lives, which `ChainConfig`
/// preset to run. Loaded from CLI flags in `cmd/ledger` (SPEC_FULL §11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub chain: ChainConfig,
    /// Empty selects the default location under the user data directory
    /// (`spec.md` §6.1).
    pub overlay_path: String,
    pub kill_existing: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { chain: ChainConfig::default(), overlay_path: String::new(), kill_existing: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncle_reward_schedule_is_linear_and_zero_past_max_depth() {
        let config = ChainConfig::mainnet_like();
        assert_eq!(config.uncle_reward(0), U256::zero());
        assert_eq!(config.uncle_reward(1), config.block_reward * U256::from(7u64) / U256::from(8u64));
        assert_eq!(config.uncle_reward(6), config.block_reward * U256::from(2u64) / U256::from(8u64));
        assert_eq!(config.uncle_reward(7), U256::zero());
    }

    #[test]
    fn test_preset_keeps_gas_schedule_but_trivial_difficulty() {
        let config = ChainConfig::test_preset();
        assert_eq!(config.genesis_difficulty, U256::from(1u64));
        assert_eq!(config.call_base_gas, ChainConfig::mainnet_like().call_base_gas);
    }
}
