//! Gas, reward, and uncle constants exposed per `spec.md` §6.6.

use ethereum_types::U256;

/// Gas charged per byte of transaction calldata.
pub const DATA_GAS_PER_BYTE: u64 = 68;
/// Base intrinsic gas for a `call` transaction (`to` is `Some`).
pub const CALL_BASE_GAS: u64 = 21_000;
/// Base intrinsic gas for a `create` transaction (`to` is `None`).
pub const CREATION_BASE_GAS: u64 = 53_000;

/// Maximum uncles a block may include.
pub const MAX_UNCLES: usize = 2;
/// Uncle inclusion is only valid up to this many generations back.
pub const MAX_UNCLE_DEPTH: u64 = 6;

/// Fixed base block reward, in wei.
pub fn block_reward() -> U256 {
    U256::from(5_000_000_000_000_000_000u64)
}

/// Reward paid to an uncle's coinbase at the given depth (1-based distance
/// from the including block). Classic linear schedule: `reward * (8 -
/// depth) / 8`, zero beyond `MAX_UNCLE_DEPTH`.
pub fn uncle_reward(depth: u64) -> U256 {
    if depth == 0 || depth > MAX_UNCLE_DEPTH {
        return U256::zero();
    }
    block_reward() * U256::from(8 - depth) / U256::from(8)
}

/// Genesis proof-of-work difficulty target.
pub fn genesis_difficulty() -> U256 {
    U256::from(131_072u64)
}

/// Computes the intrinsic gas floor for a transaction (`spec.md` §4.3 step 3).
pub fn intrinsic_gas(data_len: usize, is_creation: bool) -> u64 {
    let base = if is_creation { CREATION_BASE_GAS } else { CALL_BASE_GAS };
    base + DATA_GAS_PER_BYTE * data_len as u64
}
