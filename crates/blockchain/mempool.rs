//! `Mempool`: the "transaction queue" `spec.md` §4.7's `sync`/`cull` operate
//! on but never specify the shape of (SPEC_FULL §4.9). Transactions are
//! indexed by sender and nonce, as the teacher's `crates/blockchain/mempool.rs`
//! indexes its pool by hash with a sender/nonce-aware eviction policy;
//! simplified here to a `BTreeMap<nonce, Transaction>` per sender since gas
//! price/priority fee auctioning is out of this engine's scope.

use std::collections::{BTreeMap, HashMap};

use ethereum_types::{Address, H256, U256};
use ledger_common::Transaction;

use crate::error::MempoolError;

#[derive(Debug, Default)]
pub struct Mempool {
    by_sender: HashMap<Address, BTreeMap<U256, Transaction>>,
    senders_by_hash: HashMap<H256, Address>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.senders_by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders_by_hash.is_empty()
    }

    pub fn contains(&self, hash: &H256) -> bool {
        self.senders_by_hash.contains_key(hash)
    }

    /// Adds `tx` from `sender`. Fails if the same transaction hash is
    /// already pooled.
    pub fn add(&mut self, sender: Address, tx: Transaction) -> Result<(), MempoolError> {
        let hash = tx.hash();
        if self.senders_by_hash.contains_key(&hash) {
            return Err(MempoolError::Duplicate);
        }
        self.senders_by_hash.insert(hash, sender);
        self.by_sender.entry(sender).or_default().insert(tx.nonce, tx);
        Ok(())
    }

    pub fn remove(&mut self, hash: &H256) {
        if let Some(sender) = self.senders_by_hash.remove(hash) {
            if let Some(by_nonce) = self.by_sender.get_mut(&sender) {
                by_nonce.retain(|_, tx| &tx.hash() != hash);
                if by_nonce.is_empty() {
                    self.by_sender.remove(&sender);
                }
            }
        }
    }

    /// Removes every queued transaction from `sender` whose nonce is
    /// strictly below `floor` (stale: already applied or superseded).
    pub fn drop_stale(&mut self, sender: &Address, floor: U256) {
        if let Some(by_nonce) = self.by_sender.get_mut(sender) {
            let stale: Vec<U256> = by_nonce.range(..floor).map(|(n, _)| *n).collect();
            for nonce in stale {
                if let Some(tx) = by_nonce.remove(&nonce) {
                    self.senders_by_hash.remove(&tx.hash());
                }
            }
            if by_nonce.is_empty() {
                self.by_sender.remove(sender);
            }
        }
    }

    /// Transactions from `sender`, in ascending nonce order — the order
    /// `sync(transactionQueue)` must attempt to re-apply them in.
    pub fn transactions_from(&self, sender: &Address) -> Vec<Transaction> {
        self.by_sender.get(sender).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    pub fn senders(&self) -> Vec<Address> {
        self.by_sender.keys().copied().collect()
    }

    /// Every pooled transaction, senders in iteration order, nonce-ascending
    /// within a sender. No gas-price auctioning (out of scope): this is
    /// priority in the weak sense of "applicable order", not a fee market.
    pub fn iter_by_priority(&self) -> Vec<Transaction> {
        self.by_sender.values().flat_map(|m| m.values().cloned()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(nonce: u64) -> Transaction {
        use ledger_common::{To, TxSignature};
        Transaction {
            nonce: U256::from(nonce),
            gas_price: U256::from(1u64),
            gas: 21_000,
            to: To(Some(Address::from_low_u64_be(2))),
            value: U256::from(1u64),
            data: vec![],
            signature: TxSignature { r: U256::from(1u64), s: U256::from(1u64), recovery_id: 0 },
        }
    }

    #[test]
    fn add_rejects_duplicate_hash() {
        let mut pool = Mempool::new();
        let sender = Address::from_low_u64_be(1);
        let tx = sample_tx(0);
        pool.add(sender, tx.clone()).unwrap();
        assert_eq!(pool.add(sender, tx), Err(MempoolError::Duplicate));
    }

    #[test]
    fn drop_stale_removes_only_below_floor() {
        let mut pool = Mempool::new();
        let sender = Address::from_low_u64_be(1);
        pool.add(sender, sample_tx(0)).unwrap();
        pool.add(sender, sample_tx(1)).unwrap();
        pool.add(sender, sample_tx(2)).unwrap();

        pool.drop_stale(&sender, U256::from(2u64));
        let remaining: Vec<U256> = pool.transactions_from(&sender).iter().map(|t| t.nonce).collect();
        assert_eq!(remaining, vec![U256::from(2u64)]);
    }
}
