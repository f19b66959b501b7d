//! `WorldTrie`: an authenticated `Address -> Account` mapping bound to an
//! `Overlay` (`spec.md` §3 `WorldTrie`). Per-account storage tries are
//! opened the same way by `ledger-blockchain`'s commit algorithm, reusing
//! the same overlay as their backing `TrieDB`.

use std::sync::Arc;

use ethereum_types::{Address, H256};
use ledger_common::Account;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use ledger_trie::Trie;

use crate::error::StoreError;
use crate::overlay::Overlay;

pub struct WorldTrie {
    trie: Trie,
}

impl WorldTrie {
    /// A fresh, empty world trie over `overlay`.
    pub fn new(overlay: Overlay) -> Self {
        Self { trie: Trie::new(Arc::new(overlay)) }
    }

    /// Reopens a previously committed world trie at `root`.
    pub fn open(overlay: Overlay, root: H256) -> Self {
        Self { trie: Trie::open(Arc::new(overlay), root) }
    }

    pub fn root(&self) -> H256 {
        self.trie.root()
    }

    pub fn get_account(&self, address: &Address) -> Result<Option<Account>, StoreError> {
        match self.trie.get(address.as_bytes())? {
            Some(encoded) => Ok(Some(Account::decode(&encoded)?)),
            None => Ok(None),
        }
    }

    pub fn insert_account(&mut self, address: &Address, account: &Account) -> Result<(), StoreError> {
        self.trie.insert(address.as_bytes(), account.encode_to_vec())?;
        Ok(())
    }

    pub fn remove_account(&mut self, address: &Address) -> Result<(), StoreError> {
        self.trie.remove(address.as_bytes())?;
        Ok(())
    }

    /// Flushes every node touched since the last commit to the overlay's
    /// write journal and returns the new root. Note this does not durably
    /// persist anything by itself — the overlay's own `commit()` does that
    /// (`spec.md` §4.2: "commit is all-or-nothing at the overlay layer").
    pub fn commit(&mut self) -> Result<H256, StoreError> {
        Ok(self.trie.commit()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn new_overlay() -> Overlay {
        Overlay::new(Arc::new(InMemoryBackend::new()))
    }

    #[test]
    fn insert_get_remove_account() {
        let overlay = new_overlay();
        let mut world = WorldTrie::new(overlay);
        let addr = Address::from_low_u64_be(1);
        let account = Account { nonce: 1u8.into(), balance: 100u8.into(), ..Account::new_empty() };

        world.insert_account(&addr, &account).unwrap();
        assert_eq!(world.get_account(&addr).unwrap(), Some(account));

        world.remove_account(&addr).unwrap();
        assert_eq!(world.get_account(&addr).unwrap(), None);
    }

    #[test]
    fn commit_then_reopen_reproduces_account() {
        let overlay = new_overlay();
        let mut world = WorldTrie::new(overlay.clone());
        let addr = Address::from_low_u64_be(2);
        let account = Account { nonce: 0u8.into(), balance: 500u8.into(), ..Account::new_empty() };
        world.insert_account(&addr, &account).unwrap();
        let root = world.commit().unwrap();
        overlay.commit().unwrap();

        let reopened = WorldTrie::open(overlay, root);
        assert_eq!(reopened.get_account(&addr).unwrap(), Some(account));
    }
}
