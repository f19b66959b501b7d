//! The `Host` capability trait (`spec.md` §4.4, §9).
//!
//! An external EVM interpreter is driven against a `Host` rather than
//! against `AccountCache` directly: it can read/write balance, nonce,
//! storage and code, and open/close nested checkpoints for re-entrant
//! `CALL`/`CREATE`, but has no access to anything else `ledger-blockchain`
//! carries (mempool, chain view, block assembly). Grounded in the
//! `WorldState`/`Contract`/`Storage`/`Code` trait split from
//! `examples/other_examples/941aa36a_openethereum-openethereum__bin-ethrun-src-exec-state.rs.rs`,
//! collapsed into one trait since a single `AccountCache` will implement it.

use std::collections::HashMap;

use ethereum_types::{Address, H256, U256};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("account {0:?} has insufficient balance for this transfer")]
    InsufficientBalance(Address),
    #[error("no open checkpoint to revert or discard")]
    NoOpenCheckpoint,
    #[error("call depth exceeded")]
    DepthExceeded,
}

/// The capability surface a byte-code `Interpreter` is handed for the
/// duration of a single top-level `CALL`/`CREATE` (`spec.md` §4.4).
///
/// Every mutation taken through this trait must be revertable by
/// `revert_to_checkpoint`: callers open a checkpoint before invoking a
/// nested `create`/`call` and either `discard_checkpoint` (keep the
/// effects) or `revert_to_checkpoint` (undo them) once it returns.
pub trait Host {
    fn balance(&self, address: &Address) -> U256;
    fn add_balance(&mut self, address: &Address, amount: U256);
    /// Fails with `InsufficientBalance` rather than underflowing.
    fn sub_balance(&mut self, address: &Address, amount: U256) -> Result<(), HostError>;

    fn nonce(&self, address: &Address) -> U256;
    fn increment_nonce(&mut self, address: &Address);

    fn code(&self, address: &Address) -> Vec<u8>;
    fn set_code(&mut self, address: &Address, code: Vec<u8>);

    fn storage(&self, address: &Address, key: &H256) -> H256;
    fn set_storage(&mut self, address: &Address, key: H256, value: H256);

    /// True if the account has ever been touched (`spec.md` §4.1
    /// `addressInUse`): nonzero nonce, balance, code, or prior touch.
    fn address_in_use(&self, address: &Address) -> bool;

    /// Opens a new checkpoint on top of the current one and returns its
    /// depth, for diagnostics only — callers don't need to track it.
    fn checkpoint(&mut self) -> usize;
    fn revert_to_checkpoint(&mut self);
    fn discard_checkpoint(&mut self);
}

/// A plain `HashMap`-backed `Host` used by this crate's own tests — not
/// wired to a trie or an overlay. `ledger-blockchain`'s `AccountCache` is
/// the real implementation used in production.
#[derive(Debug, Default, Clone)]
struct MinimalAccount {
    balance: U256,
    nonce: U256,
    code: Vec<u8>,
    storage: HashMap<H256, H256>,
    touched: bool,
}

#[derive(Debug, Default)]
pub struct MinimalHost {
    accounts: HashMap<Address, MinimalAccount>,
    checkpoints: Vec<HashMap<Address, Option<MinimalAccount>>>,
}

impl MinimalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.entry(&address).balance = balance;
    }

    fn entry(&mut self, address: &Address) -> &mut MinimalAccount {
        self.accounts.entry(*address).or_default()
    }

    /// Records the pre-image of `address` in the innermost open checkpoint,
    /// the first time it's touched since that checkpoint was opened.
    fn snapshot_if_needed(&mut self, address: &Address) {
        if let Some(frame) = self.checkpoints.last_mut() {
            frame
                .entry(*address)
                .or_insert_with(|| self.accounts.get(address).cloned());
        }
    }
}

impl Host for MinimalHost {
    fn balance(&self, address: &Address) -> U256 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or_default()
    }

    fn add_balance(&mut self, address: &Address, amount: U256) {
        self.snapshot_if_needed(address);
        self.entry(address).balance += amount;
        self.entry(address).touched = true;
    }

    fn sub_balance(&mut self, address: &Address, amount: U256) -> Result<(), HostError> {
        if self.balance(address) < amount {
            return Err(HostError::InsufficientBalance(*address));
        }
        self.snapshot_if_needed(address);
        self.entry(address).balance -= amount;
        Ok(())
    }

    fn nonce(&self, address: &Address) -> U256 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or_default()
    }

    fn increment_nonce(&mut self, address: &Address) {
        self.snapshot_if_needed(address);
        self.entry(address).nonce += U256::one();
    }

    fn code(&self, address: &Address) -> Vec<u8> {
        self.accounts.get(address).map(|a| a.code.clone()).unwrap_or_default()
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        self.snapshot_if_needed(address);
        self.entry(address).code = code;
        self.entry(address).touched = true;
    }

    fn storage(&self, address: &Address, key: &H256) -> H256 {
        self.accounts
            .get(address)
            .and_then(|a| a.storage.get(key))
            .copied()
            .unwrap_or_default()
    }

    fn set_storage(&mut self, address: &Address, key: H256, value: H256) {
        self.snapshot_if_needed(address);
        self.entry(address).storage.insert(key, value);
    }

    fn address_in_use(&self, address: &Address) -> bool {
        self.accounts
            .get(address)
            .map(|a| a.touched || !a.balance.is_zero() || !a.nonce.is_zero() || !a.code.is_empty())
            .unwrap_or(false)
    }

    fn checkpoint(&mut self) -> usize {
        self.checkpoints.push(HashMap::new());
        self.checkpoints.len()
    }

    fn revert_to_checkpoint(&mut self) {
        if let Some(frame) = self.checkpoints.pop() {
            for (address, pre_image) in frame {
                match pre_image {
                    Some(account) => {
                        self.accounts.insert(address, account);
                    }
                    None => {
                        self.accounts.remove(&address);
                    }
                }
            }
        }
    }

    fn discard_checkpoint(&mut self) {
        // Merge into the parent frame so an outer revert still undoes it.
        if let Some(frame) = self.checkpoints.pop() {
            if let Some(parent) = self.checkpoints.last_mut() {
                for (address, pre_image) in frame {
                    parent.entry(address).or_insert(pre_image);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_transfers_and_rejects_overdraft() {
        let mut host = MinimalHost::new();
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        host.set_balance(a, U256::from(100u64));

        host.sub_balance(&a, U256::from(40u64)).unwrap();
        host.add_balance(&b, U256::from(40u64));
        assert_eq!(host.balance(&a), U256::from(60u64));
        assert_eq!(host.balance(&b), U256::from(40u64));

        assert_eq!(
            host.sub_balance(&a, U256::from(1000u64)),
            Err(HostError::InsufficientBalance(a))
        );
    }

    #[test]
    fn checkpoint_revert_undoes_nested_mutation() {
        let mut host = MinimalHost::new();
        let a = Address::from_low_u64_be(1);
        host.set_balance(a, U256::from(100u64));

        host.checkpoint();
        host.add_balance(&a, U256::from(50u64));
        host.increment_nonce(&a);
        assert_eq!(host.balance(&a), U256::from(150u64));

        host.revert_to_checkpoint();
        assert_eq!(host.balance(&a), U256::from(100u64));
        assert_eq!(host.nonce(&a), U256::zero());
    }

    #[test]
    fn discard_checkpoint_keeps_changes_but_outer_revert_still_undoes_them() {
        let mut host = MinimalHost::new();
        let a = Address::from_low_u64_be(1);
        host.set_balance(a, U256::from(10u64));

        host.checkpoint();
        host.checkpoint();
        host.add_balance(&a, U256::from(5u64));
        host.discard_checkpoint();
        assert_eq!(host.balance(&a), U256::from(15u64));

        host.revert_to_checkpoint();
        assert_eq!(host.balance(&a), U256::from(10u64));
    }

    #[test]
    fn address_in_use_tracks_touch() {
        let mut host = MinimalHost::new();
        let a = Address::from_low_u64_be(9);
        assert!(!host.address_in_use(&a));
        host.add_balance(&a, U256::from(1u64));
        assert!(host.address_in_use(&a));
    }
}
