//! The account cache: a write-through mirror of accounts currently being
//! touched, flushable to the `WorldTrie` (`spec.md` §4.1, §4.2; SPEC_FULL §3
//! SUPPLEMENT). Dirty-tracking (`Filth`) is grounded in
//! `examples/other_examples/54c422a0_..._ethcore-src-state-account.rs.rs`;
//! the checkpoint stack for re-entrant revert is grounded in
//! `examples/other_examples/0b26453d_Conflux-Chain-cfx-evm__src-state-mod.rs.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::{Address, H256, U256};
use ledger_common::Account;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use ledger_storage::{Overlay, WorldTrie};
use ledger_trie::Trie;
use ledger_vm::{Host, HostError};

use crate::error::ExecutionError;

/// `Clean` entries are skipped entirely at commit time instead of being
/// re-serialized (`spec.md` §4.2 step 4 only applies to entries that were
/// actually touched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filth {
    Clean,
    Dirty,
}

#[derive(Debug, Clone)]
pub(crate) struct CachedAccount {
    pub account: Account,
    pub storage_delta: HashMap<H256, H256>,
    pub fresh_code: Option<Vec<u8>>,
    pub loaded_code: Option<Vec<u8>>,
    pub alive: bool,
    pub filth: Filth,
}

impl CachedAccount {
    fn from_account(account: Account) -> Self {
        Self {
            account,
            storage_delta: HashMap::new(),
            fresh_code: None,
            loaded_code: None,
            alive: true,
            filth: Filth::Clean,
        }
    }

    fn empty() -> Self {
        Self::from_account(Account::new_empty())
    }
}

pub struct AccountCache {
    overlay: Overlay,
    pub(crate) accounts: HashMap<Address, CachedAccount>,
    checkpoints: Vec<HashMap<Address, Option<CachedAccount>>>,
}

impl AccountCache {
    pub fn new(overlay: Overlay) -> Self {
        Self { overlay, accounts: HashMap::new(), checkpoints: Vec::new() }
    }

    /// Loads `addr` from `world` into the cache if it isn't already present.
    /// `force_create` inserts a zero account when the trie has none; a miss
    /// without `force_create` leaves the cache untouched (reads then fall
    /// back to zero). `require_code` eagerly pulls the code blob via the
    /// account's `codeHash`.
    pub fn ensure_cached(
        &mut self,
        world: &WorldTrie,
        addr: Address,
        require_code: bool,
        force_create: bool,
    ) -> Result<(), ExecutionError> {
        if !self.accounts.contains_key(&addr) {
            match world.get_account(&addr)? {
                Some(account) => {
                    self.accounts.insert(addr, CachedAccount::from_account(account));
                }
                None if force_create => {
                    self.accounts.insert(addr, CachedAccount::empty());
                }
                None => return Ok(()),
            }
        }
        if require_code {
            self.load_code_if_needed(addr)?;
        }
        Ok(())
    }

    fn load_code_if_needed(&mut self, addr: Address) -> Result<(), ExecutionError> {
        let Some(cached) = self.accounts.get(&addr) else { return Ok(()) };
        if cached.fresh_code.is_some() || cached.loaded_code.is_some() {
            return Ok(());
        }
        if cached.account.code_hash == Account::empty_code_hash() {
            return Ok(());
        }
        let code = self.overlay.get(cached.account.code_hash.as_bytes())?;
        if let Some(cached) = self.accounts.get_mut(&addr) {
            cached.loaded_code = code;
        }
        Ok(())
    }

    /// `true` if `addr` is cached and alive, or present in `world` but not
    /// yet cached. Does not pull the account into the cache.
    pub fn address_in_use(&self, world: &WorldTrie, addr: &Address) -> Result<bool, ExecutionError> {
        if let Some(cached) = self.accounts.get(addr) {
            return Ok(cached.alive);
        }
        Ok(world.get_account(addr)?.is_some())
    }

    pub fn balance(&self, addr: &Address) -> U256 {
        self.accounts.get(addr).map(|c| c.account.balance).unwrap_or_default()
    }

    /// Like [`Self::balance`] but, for an address not yet cached, consults
    /// `world` directly instead of assuming zero. Used by `State`'s
    /// read-only API, which must not require a write lock to `ensure_cached`.
    pub fn balance_with_fallback(&self, world: &WorldTrie, addr: &Address) -> Result<U256, ExecutionError> {
        if let Some(cached) = self.accounts.get(addr) {
            return Ok(cached.account.balance);
        }
        Ok(world.get_account(addr)?.map(|a| a.balance).unwrap_or_default())
    }

    /// See [`Self::balance_with_fallback`].
    pub fn nonce_with_fallback(&self, world: &WorldTrie, addr: &Address) -> Result<U256, ExecutionError> {
        if let Some(cached) = self.accounts.get(addr) {
            return Ok(cached.account.nonce);
        }
        Ok(world.get_account(addr)?.map(|a| a.nonce).unwrap_or_default())
    }

    /// See [`Self::balance_with_fallback`].
    pub fn storage_with_fallback(
        &self,
        world: &WorldTrie,
        addr: &Address,
        key: &H256,
    ) -> Result<H256, ExecutionError> {
        if self.accounts.contains_key(addr) {
            return self.storage(addr, key);
        }
        let Some(account) = world.get_account(addr)? else { return Ok(H256::zero()) };
        if account.storage_root == Account::empty_storage_root() {
            return Ok(H256::zero());
        }
        let trie = Trie::open(Arc::new(self.overlay.clone()), account.storage_root);
        match trie.get(key.as_bytes())? {
            Some(encoded) => {
                let value = U256::decode(&encoded)?;
                Ok(H256::from(value.to_big_endian()))
            }
            None => Ok(H256::zero()),
        }
    }

    /// Adds `value` modulo 2^256. Overflow is a consensus bug, not a
    /// runtime error: the caller guarantees no overflow (`spec.md` §4.1).
    pub fn add_balance(&mut self, addr: Address, value: U256) {
        if value.is_zero() && self.accounts.contains_key(&addr) {
            return;
        }
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.account.balance += value;
        cached.alive = true;
        cached.filth = Filth::Dirty;
    }

    pub fn sub_balance(&mut self, addr: Address, value: U256) -> Result<(), HostError> {
        if self.balance(&addr) < value {
            return Err(HostError::InsufficientBalance(addr));
        }
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.account.balance -= value;
        cached.filth = Filth::Dirty;
        Ok(())
    }

    /// Sets the nonce outright rather than incrementing it. Only used by
    /// genesis loading (SPEC_FULL §4.8), where allocations may specify a
    /// starting nonce directly instead of it being derived from sends.
    pub fn set_nonce(&mut self, addr: Address, nonce: U256) {
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.account.nonce = nonce;
        cached.alive = true;
        cached.filth = Filth::Dirty;
    }

    pub fn transactions_from(&self, addr: &Address) -> U256 {
        self.accounts.get(addr).map(|c| c.account.nonce).unwrap_or_default()
    }

    /// Increments the sender's nonce; creates the cache entry if absent
    /// (the caller is expected to have already `ensure_cached`d it if it
    /// might exist in the trie — `spec.md` §4.1).
    pub fn note_sending(&mut self, addr: Address) {
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.account.nonce += U256::one();
        cached.alive = true;
        cached.filth = Filth::Dirty;
    }

    pub fn code(&self, addr: &Address) -> Vec<u8> {
        self.accounts
            .get(addr)
            .and_then(|c| c.fresh_code.clone().or_else(|| c.loaded_code.clone()))
            .unwrap_or_default()
    }

    pub fn set_code(&mut self, addr: Address, code: Vec<u8>) {
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.fresh_code = Some(code);
        cached.alive = true;
        cached.filth = Filth::Dirty;
    }

    /// Reads `key`, checking the pending delta first, then the per-account
    /// storage trie at the account's last-committed `storageRoot`.
    pub fn storage(&self, addr: &Address, key: &H256) -> Result<H256, ExecutionError> {
        let Some(cached) = self.accounts.get(addr) else { return Ok(H256::zero()) };
        if let Some(value) = cached.storage_delta.get(key) {
            return Ok(*value);
        }
        if cached.account.storage_root == Account::empty_storage_root() {
            return Ok(H256::zero());
        }
        let trie = Trie::open(Arc::new(self.overlay.clone()), cached.account.storage_root);
        match trie.get(key.as_bytes())? {
            Some(encoded) => {
                let value = U256::decode(&encoded)?;
                Ok(H256::from(value.to_big_endian()))
            }
            None => Ok(H256::zero()),
        }
    }

    /// Records the write in `storageDelta`; the per-account storage trie
    /// isn't touched until `commit` (`spec.md` §4.1).
    pub fn set_storage(&mut self, addr: Address, key: H256, value: H256) {
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.storage_delta.insert(key, value);
        cached.filth = Filth::Dirty;
    }

    /// Marks `addr` dead; `commit` will remove it from the world trie
    /// instead of re-inserting it.
    pub fn kill(&mut self, addr: Address) {
        self.snapshot_if_needed(addr);
        let cached = self.accounts.entry(addr).or_insert_with(CachedAccount::empty);
        cached.alive = false;
        cached.filth = Filth::Dirty;
    }

    fn snapshot_if_needed(&mut self, addr: Address) {
        if let Some(frame) = self.checkpoints.last_mut() {
            frame.entry(addr).or_insert_with(|| self.accounts.get(&addr).cloned());
        }
    }

    pub fn checkpoint(&mut self) -> usize {
        self.checkpoints.push(HashMap::new());
        self.checkpoints.len()
    }

    pub fn revert_to_checkpoint(&mut self) {
        if let Some(frame) = self.checkpoints.pop() {
            for (addr, pre_image) in frame {
                match pre_image {
                    Some(account) => {
                        self.accounts.insert(addr, account);
                    }
                    None => {
                        self.accounts.remove(&addr);
                    }
                }
            }
        }
    }

    pub fn discard_checkpoint(&mut self) {
        if let Some(frame) = self.checkpoints.pop() {
            if let Some(parent) = self.checkpoints.last_mut() {
                for (addr, pre_image) in frame {
                    parent.entry(addr).or_insert(pre_image);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.accounts.clear();
        self.checkpoints.clear();
    }

    /// Folds every dirty cache entry into `world` (`spec.md` §4.2) and
    /// returns the new world-trie root. Clean entries are skipped. The
    /// cache is cleared afterwards.
    pub fn commit(&mut self, world: &mut WorldTrie) -> Result<H256, ExecutionError> {
        let dirty: Vec<(Address, CachedAccount)> = self
            .accounts
            .drain()
            .filter(|(_, cached)| cached.filth == Filth::Dirty)
            .collect();

        for (addr, mut cached) in dirty {
            if !cached.alive {
                world.remove_account(&addr)?;
                continue;
            }

            if !cached.storage_delta.is_empty() {
                let mut storage_trie = if cached.account.storage_root == Account::empty_storage_root()
                {
                    Trie::new(Arc::new(self.overlay.clone()))
                } else {
                    Trie::open(Arc::new(self.overlay.clone()), cached.account.storage_root)
                };
                for (key, value) in cached.storage_delta.drain() {
                    if value.is_zero() {
                        storage_trie.remove(key.as_bytes())?;
                    } else {
                        storage_trie.insert(key.as_bytes().to_vec(), U256::from_big_endian(value.as_bytes()).encode_to_vec())?;
                    }
                }
                cached.account.storage_root = storage_trie.commit()?;
            }

            if let Some(code) = cached.fresh_code.take() {
                let hash = H256::from(ledger_crypto::keccak::keccak_hash(&code));
                self.overlay.put(hash.as_bytes().to_vec(), code)?;
                cached.account.code_hash = hash;
            }

            world.insert_account(&addr, &cached.account)?;
        }

        Ok(world.commit()?)
    }
}

/// Adapts an `AccountCache` to the `ledger-vm` `Host` capability surface.
/// Cache-only: the caller (`State::create`/`call`) is responsible for
/// `ensure_cached`-ing every address the interpreter might touch before
/// handing it a `CacheHost`, since `Host`'s infallible signatures have no
/// way to surface a trie I/O error.
pub struct CacheHost<'a>(pub &'a mut AccountCache);

impl Host for CacheHost<'_> {
    fn balance(&self, address: &Address) -> U256 {
        self.0.balance(address)
    }

    fn add_balance(&mut self, address: &Address, amount: U256) {
        self.0.add_balance(*address, amount)
    }

    fn sub_balance(&mut self, address: &Address, amount: U256) -> Result<(), HostError> {
        self.0.sub_balance(*address, amount)
    }

    fn nonce(&self, address: &Address) -> U256 {
        self.0.transactions_from(address)
    }

    fn increment_nonce(&mut self, address: &Address) {
        self.0.note_sending(*address)
    }

    fn code(&self, address: &Address) -> Vec<u8> {
        self.0.code(address)
    }

    fn set_code(&mut self, address: &Address, code: Vec<u8>) {
        self.0.set_code(*address, code)
    }

    fn storage(&self, address: &Address, key: &H256) -> H256 {
        self.0.storage(address, key).unwrap_or_default()
    }

    fn set_storage(&mut self, address: &Address, key: H256, value: H256) {
        self.0.set_storage(*address, key, value)
    }

    fn address_in_use(&self, address: &Address) -> bool {
        self.0.accounts.get(address).map(|c| c.alive).unwrap_or(false)
    }

    fn checkpoint(&mut self) -> usize {
        self.0.checkpoint()
    }

    fn revert_to_checkpoint(&mut self) {
        self.0.revert_to_checkpoint()
    }

    fn discard_checkpoint(&mut self) {
        self.0.discard_checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_storage::backend::InMemoryBackend;

    fn new_overlay() -> Overlay {
        Overlay::new(Arc::new(InMemoryBackend::new()))
    }

    #[test]
    fn add_and_sub_balance_create_account_lazily() {
        let overlay = new_overlay();
        let mut cache = AccountCache::new(overlay);
        let addr = Address::from_low_u64_be(1);

        cache.add_balance(addr, U256::from(100u64));
        assert_eq!(cache.balance(&addr), U256::from(100u64));

        cache.sub_balance(addr, U256::from(40u64)).unwrap();
        assert_eq!(cache.balance(&addr), U256::from(60u64));

        assert_eq!(
            cache.sub_balance(addr, U256::from(1000u64)),
            Err(HostError::InsufficientBalance(addr))
        );
    }

    #[test]
    fn checkpoint_revert_undoes_balance_and_nonce() {
        let overlay = new_overlay();
        let mut cache = AccountCache::new(overlay);
        let addr = Address::from_low_u64_be(1);
        cache.add_balance(addr, U256::from(100u64));

        cache.checkpoint();
        cache.add_balance(addr, U256::from(50u64));
        cache.note_sending(addr);
        assert_eq!(cache.balance(&addr), U256::from(150u64));

        cache.revert_to_checkpoint();
        assert_eq!(cache.balance(&addr), U256::from(100u64));
        assert_eq!(cache.transactions_from(&addr), U256::zero());
    }

    #[test]
    fn set_storage_is_pending_until_commit() {
        let overlay = new_overlay();
        let mut cache = AccountCache::new(overlay);
        let addr = Address::from_low_u64_be(1);
        cache.add_balance(addr, U256::zero());
        let key = H256::from_low_u64_be(7);

        cache.set_storage(addr, key, H256::from_low_u64_be(42));
        assert_eq!(cache.storage(&addr, &key).unwrap(), H256::from_low_u64_be(42));
    }

    #[test]
    fn commit_skips_clean_entries_and_removes_dead_ones() {
        let overlay = new_overlay();
        let mut cache = AccountCache::new(overlay.clone());
        let mut world = WorldTrie::new(overlay);
        let addr = Address::from_low_u64_be(1);

        cache.add_balance(addr, U256::from(10u64));
        cache.commit(&mut world).unwrap();
        assert_eq!(world.get_account(&addr).unwrap().unwrap().balance, U256::from(10u64));

        cache.kill(addr);
        cache.commit(&mut world).unwrap();
        assert_eq!(world.get_account(&addr).unwrap(), None);
    }
}
