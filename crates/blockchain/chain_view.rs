//! `ChainView`: the external block-chain-store collaborator (`spec.md` §6.2).
//! The state engine never mutates this store — it only queries parent
//! headers, ancestry, and the canonical head. A concrete implementation
//! (persistence, P2P sync) is out of scope (`spec.md` §1); this crate only
//! specifies the trait surface the block pipeline consumes.

use ethereum_types::{H256, U256};
use ledger_common::BlockHeader;

/// Summary of a block's position in the chain, as the collaborator reports
/// it (`spec.md` §6.2 `details(hash)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDetails {
    pub total_difficulty: U256,
    pub number: u64,
    pub parent: H256,
}

pub trait ChainView {
    fn info(&self, hash: H256) -> Option<BlockHeader>;
    fn details(&self, hash: H256) -> Option<BlockDetails>;
    fn current_hash(&self) -> H256;
    fn genesis_hash(&self) -> H256;

    /// Ancestor chain from `from` back towards `to` (exclusive of `to`),
    /// nearest first. Empty if `to` is not an ancestor of `from`.
    fn ancestors(&self, from: H256, to: H256) -> Vec<H256>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory `ChainView` used by this crate's own tests — not part
    /// of the public surface.
    #[derive(Default)]
    pub struct InMemoryChainView {
        headers: HashMap<H256, BlockHeader>,
        details: HashMap<H256, BlockDetails>,
        head: H256,
        genesis: H256,
    }

    impl InMemoryChainView {
        pub fn new(genesis: H256) -> Self {
            Self { genesis, head: genesis, ..Default::default() }
        }

        pub fn insert(&mut self, header: BlockHeader, total_difficulty: U256) {
            let hash = header.hash();
            let number = header.number;
            let parent = header.parent_hash;
            self.details.insert(hash, BlockDetails { total_difficulty, number, parent });
            self.headers.insert(hash, header);
            self.head = hash;
        }
    }

    impl ChainView for InMemoryChainView {
        fn info(&self, hash: H256) -> Option<BlockHeader> {
            self.headers.get(&hash).cloned()
        }

        fn details(&self, hash: H256) -> Option<BlockDetails> {
            self.details.get(&hash).copied()
        }

        fn current_hash(&self) -> H256 {
            self.head
        }

        fn genesis_hash(&self) -> H256 {
            self.genesis
        }

        fn ancestors(&self, from: H256, to: H256) -> Vec<H256> {
            let mut out = Vec::new();
            let mut cursor = from;
            while cursor != to {
                out.push(cursor);
                match self.details.get(&cursor) {
                    Some(details) => cursor = details.parent,
                    None => break,
                }
            }
            out
        }
    }
}
