//! A minimal, file-backed `ChainView` (`spec.md` §6.2).
//!
//! The real block chain store — persistence, fork-choice, peer sync — is an
//! external collaborator out of this engine's scope (`spec.md` §1). This
//! CLI still needs *something* concrete to hand `State::playback`,
//! `commit_to_mine`, and `sync_to_chain_head`, so `ChainStore` is the
//! smallest thing that satisfies the `ChainView` contract: headers and
//! total-difficulty bookkeeping serialized to a JSON sidecar file next to
//! the overlay database. It performs no fork-choice of its own (`spec.md`
//! §1 non-goals) — `import` always advances the head to the block it just
//! played back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ethereum_types::{H256, U256};
use ledger_blockchain::{BlockDetails, ChainView};
use ledger_common::BlockHeader;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default)]
struct StoredChain {
    /// hex-encoded RLP header, keyed by hex header hash.
    headers: HashMap<String, String>,
    details: HashMap<String, StoredDetails>,
    head: Option<String>,
    genesis: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy)]
struct StoredDetails {
    total_difficulty: U256,
    number: u64,
    parent: String,
}

/// In-memory chain index, optionally persisted to `path` on every mutation.
pub struct ChainStore {
    path: Option<PathBuf>,
    headers: HashMap<H256, BlockHeader>,
    details: HashMap<H256, BlockDetails>,
    head: H256,
    genesis: H256,
}

impl ChainStore {
    /// Loads an existing sidecar file at `path`, or starts empty if absent.
    /// `path = None` selects a purely in-memory store (the `--datadir
    /// memory` case).
    pub fn open(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut store =
            Self { path, headers: HashMap::new(), details: HashMap::new(), head: H256::zero(), genesis: H256::zero() };
        if let Some(path) = &store.path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)?;
                let stored: StoredChain = serde_json::from_str(&contents)?;
                for (hash_hex, header_hex) in stored.headers {
                    let hash = parse_hash(&hash_hex)?;
                    let bytes = hex::decode(header_hex.trim_start_matches("0x"))?;
                    let header = BlockHeader::decode(&bytes)
                        .map_err(|e| anyhow::anyhow!("decoding stored header {hash_hex}: {e}"))?;
                    store.headers.insert(hash, header);
                }
                for (hash_hex, details) in stored.details {
                    let hash = parse_hash(&hash_hex)?;
                    let parent = parse_hash(&details.parent)?;
                    store.details.insert(
                        hash,
                        BlockDetails { total_difficulty: details.total_difficulty, number: details.number, parent },
                    );
                }
                if let Some(head) = stored.head {
                    store.head = parse_hash(&head)?;
                }
                if let Some(genesis) = stored.genesis {
                    store.genesis = parse_hash(&genesis)?;
                }
            }
        }
        Ok(store)
    }

    /// Seeds the store with `header` as genesis (number 0, no parent).
    /// No-op if a genesis is already recorded.
    pub fn seed_genesis(&mut self, header: BlockHeader) -> anyhow::Result<()> {
        if !self.headers.is_empty() {
            return Ok(());
        }
        let hash = header.hash();
        let difficulty = header.difficulty;
        self.genesis = hash;
        self.head = hash;
        self.details.insert(hash, BlockDetails { total_difficulty: difficulty, number: header.number, parent: H256::zero() });
        self.headers.insert(hash, header);
        self.persist()
    }

    /// Records `header` and advances the head to it. `added_difficulty` is
    /// the value `State::playback` returned for this block.
    pub fn advance_head(&mut self, header: BlockHeader, added_difficulty: U256) -> anyhow::Result<()> {
        let hash = header.hash();
        let parent_total = self
            .details
            .get(&header.parent_hash)
            .map(|d| d.total_difficulty)
            .unwrap_or_default();
        self.details.insert(
            hash,
            BlockDetails { total_difficulty: parent_total + added_difficulty, number: header.number, parent: header.parent_hash },
        );
        self.headers.insert(hash, header);
        self.head = hash;
        self.persist()
    }

    fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let mut stored = StoredChain::default();
        for (hash, header) in &self.headers {
            stored.headers.insert(format!("{hash:#x}"), hex::encode(header.encode_to_vec()));
        }
        for (hash, details) in &self.details {
            stored.details.insert(
                format!("{hash:#x}"),
                StoredDetails { total_difficulty: details.total_difficulty, number: details.number, parent: format!("{:#x}", details.parent) },
            );
        }
        stored.head = Some(format!("{:#x}", self.head));
        stored.genesis = Some(format!("{:#x}", self.genesis));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }
}

fn parse_hash(hex_str: &str) -> anyhow::Result<H256> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))?;
    if bytes.len() != 32 {
        anyhow::bail!("expected a 32-byte hash, got {} bytes", bytes.len());
    }
    Ok(H256::from_slice(&bytes))
}

impl ChainView for ChainStore {
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

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_common::{transactions_root, uncles_hash};

    fn header(number: u64, parent_hash: H256, difficulty: u64) -> BlockHeader {
        BlockHeader {
            parent_hash,
            uncles_hash: uncles_hash(&[]),
            coinbase: ethereum_types::Address::zero(),
            state_root: H256::zero(),
            transactions_root: transactions_root(&[]),
            difficulty: U256::from(difficulty),
            number,
            gas_limit: 8_000_000,
            timestamp: number,
            extra_data: Vec::new(),
            nonce: 0,
            mix_hash: H256::zero(),
        }
    }

    #[test]
    fn seed_then_advance_tracks_head_and_total_difficulty() {
        let mut store = ChainStore::open(None).unwrap();
        let genesis = header(0, H256::zero(), 100);
        store.seed_genesis(genesis.clone()).unwrap();
        assert_eq!(store.current_hash(), genesis.hash());

        let child = header(1, genesis.hash(), 110);
        store.advance_head(child.clone(), U256::from(110u64)).unwrap();
        assert_eq!(store.current_hash(), child.hash());
        assert_eq!(store.details(child.hash()).unwrap().total_difficulty, U256::from(210u64));
    }

    #[test]
    fn persists_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");

        let genesis = header(0, H256::zero(), 100);
        {
            let mut store = ChainStore::open(Some(path.clone())).unwrap();
            store.seed_genesis(genesis.clone()).unwrap();
        }

        let reloaded = ChainStore::open(Some(path)).unwrap();
        assert_eq!(reloaded.current_hash(), genesis.hash());
        assert_eq!(reloaded.info(genesis.hash()).unwrap(), genesis);
    }

    #[test]
    fn ancestors_walks_back_to_but_not_including_target() {
        let mut store = ChainStore::open(None).unwrap();
        let genesis = header(0, H256::zero(), 100);
        store.seed_genesis(genesis.clone()).unwrap();
        let child = header(1, genesis.hash(), 100);
        store.advance_head(child.clone(), U256::from(100u64)).unwrap();
        let grandchild = header(2, child.hash(), 100);
        store.advance_head(grandchild.clone(), U256::from(100u64)).unwrap();

        let ancestry = store.ancestors(grandchild.hash(), genesis.hash());
        assert_eq!(ancestry, vec![grandchild.hash(), child.hash()]);
    }
}
