//! `State`: the coupling of the account cache, the world trie, and the
//! candidate block described across `spec.md` §3's `StateSnapshot` and
//! §4.1–§4.7. A `State` owns one overlay-backed world trie and one account
//! cache; `fork` shares the overlay but clones neither (`spec.md` §5
//! "Copy semantics of State").
//!
//! Concurrency follows `spec.md` §5: a `parking_lot::RwLock` guards the
//! `(cache, trie, candidate block)` tuple so read-only calls (`balance`,
//! `storage`, `root_hash`, `pending`) can run concurrently with each other
//! but never alongside a mutation (`execute`, `playback`, `sync`,
//! `commit_to_mine`, `rollback`, `mine`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use ledger_common::{
    transactions_root, uncles_hash, Block, BlockHeader, CoreError, Genesis, To, Transaction,
};
use ledger_miner::{
    mine as pow_mine, validate_solution as validate_pow_solution, MineInfo, ProofOfWorkProblem,
    ProofOfWorkSolution,
};
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use ledger_storage::{Overlay, WorldTrie};
use ledger_vm::{Host, Interpreter, MinimalInterpreter};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::account_cache::{AccountCache, CacheHost};
use crate::chain_view::ChainView;
use crate::config::ChainConfig;
use crate::error::{ChainError, ExecutionError};
use crate::mempool::Mempool;

/// The mutable working set guarded by `State`'s lock: the account cache,
/// the world trie it folds into, and the in-progress candidate block
/// (`spec.md` §3 `StateSnapshot`).
struct Inner {
    world: WorldTrie,
    cache: AccountCache,
    previous_block: BlockHeader,
    current_block: BlockHeader,
    pending_txs: Vec<Transaction>,
    pending_hashes: std::collections::HashSet<H256>,
    pending_uncles: Vec<BlockHeader>,
    committed_to_mine: bool,
    sealed_bytes: Option<Vec<u8>>,
}

/// The ledger state engine: account cache + authenticated trie + candidate
/// block, coupled as `spec.md` §1 describes. Cheap to `fork`: forks share
/// the `Overlay` (and therefore the durable backend) but own independent
/// caches and candidate blocks.
pub struct State {
    overlay: Overlay,
    config: ChainConfig,
    inner: RwLock<Inner>,
    /// Shared stop flag for the in-flight `mine` search. Set by `sync`,
    /// `rollback`, and `commit_to_mine` (`spec.md` §5 "Cancellation");
    /// cleared at the start of each `mine` call.
    mining_cancel: Arc<AtomicBool>,
}

fn fresh_candidate_header(parent: &BlockHeader) -> BlockHeader {
    BlockHeader {
        parent_hash: parent.hash(),
        uncles_hash: uncles_hash(&[]),
        coinbase: Address::zero(),
        state_root: parent.state_root,
        transactions_root: transactions_root(&[]),
        difficulty: parent.difficulty,
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        timestamp: parent.timestamp + 1,
        extra_data: Vec::new(),
        nonce: 0,
        mix_hash: H256::zero(),
    }
}

/// `keccak(rlp([sender, nonce]))[12..]` (`spec.md` §4.4 `create`).
fn compute_create_address(sender: Address, nonce: U256) -> Address {
    let mut buf = Vec::new();
    ledger_rlp::structs::Encoder::new(&mut buf)
        .encode_field(&sender)
        .encode_field(&nonce)
        .finish();
    let hash = ledger_crypto::keccak::keccak_hash(buf);
    Address::from_slice(&hash[12..])
}

impl State {
    /// A `State` resuming at `head` — the baseline for the engine's next
    /// candidate block.
    pub fn new(overlay: Overlay, config: ChainConfig, head: BlockHeader) -> Self {
        let world = WorldTrie::open(overlay.clone(), head.state_root);
        let cache = AccountCache::new(overlay.clone());
        let current_block = fresh_candidate_header(&head);
        Self {
            overlay,
            config,
            inner: RwLock::new(Inner {
                world,
                cache,
                current_block,
                previous_block: head,
                pending_txs: Vec::new(),
                pending_hashes: std::collections::HashSet::new(),
                pending_uncles: Vec::new(),
                committed_to_mine: false,
                sealed_bytes: None,
            }),
            mining_cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Commits `genesis.alloc` into a fresh trie over `overlay` and returns
    /// a `State` anchored there plus the resulting genesis state root
    /// (`spec.md` §6.5; SPEC_FULL §4.8). The root must match property 3 in
    /// `spec.md` §8 for any published genesis.
    pub fn from_genesis(
        overlay: Overlay,
        config: ChainConfig,
        genesis: &Genesis,
    ) -> Result<(Self, H256), ExecutionError> {
        let mut world = WorldTrie::new(overlay.clone());
        let mut cache = AccountCache::new(overlay.clone());

        for (address, account) in &genesis.alloc {
            cache.add_balance(*address, account.balance);
            if !account.nonce.is_zero() {
                cache.set_nonce(*address, account.nonce);
            }
            if !account.code.is_empty() {
                cache.set_code(*address, account.code.clone());
            }
            for (key, value) in &account.storage {
                if !value.is_zero() {
                    cache.set_storage(*address, *key, H256::from(value.to_big_endian()));
                }
            }
        }

        let root = cache.commit(&mut world)?;
        overlay.commit()?;
        info!(?root, accounts = genesis.alloc.len(), "committed genesis state");

        let header = BlockHeader {
            parent_hash: H256::zero(),
            uncles_hash: uncles_hash(&[]),
            coinbase: genesis.coinbase,
            state_root: root,
            transactions_root: transactions_root(&[]),
            difficulty: genesis.difficulty,
            number: 0,
            gas_limit: genesis.gas_limit,
            timestamp: genesis.timestamp,
            extra_data: genesis.extra_data.clone(),
            nonce: 0,
            mix_hash: H256::zero(),
        };
        Ok((State::new(overlay, config, header), root))
    }

    /// Independent working copy: shares this engine's `Overlay` (and its
    /// durable backend) but owns a fresh cache and candidate block
    /// (`spec.md` §5 "Copy semantics of State").
    pub fn fork(&self) -> Self {
        let inner = self.inner.read();
        State::new(self.overlay.clone(), self.config.clone(), inner.previous_block.clone())
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Sets the coinbase of the in-progress candidate block. Has no effect
    /// on an already-frozen (`commit_to_mine`d) candidate.
    pub fn set_coinbase(&self, coinbase: Address) {
        self.inner.write().current_block.coinbase = coinbase;
    }

    // ---- read-only surface (spec.md §4.1, §5) -----------------------------

    pub fn root_hash(&self) -> H256 {
        self.inner.read().world.root()
    }

    pub fn balance(&self, address: &Address) -> Result<U256, ExecutionError> {
        let inner = self.inner.read();
        Ok(inner.cache.balance_with_fallback(&inner.world, address)?)
    }

    pub fn transactions_from(&self, address: &Address) -> Result<U256, ExecutionError> {
        let inner = self.inner.read();
        Ok(inner.cache.nonce_with_fallback(&inner.world, address)?)
    }

    pub fn storage(&self, address: &Address, key: &H256) -> Result<H256, ExecutionError> {
        let inner = self.inner.read();
        Ok(inner.cache.storage_with_fallback(&inner.world, address, key)?)
    }

    pub fn code(&self, address: &Address) -> Result<Vec<u8>, ExecutionError> {
        let mut inner = self.inner.write();
        inner.cache.ensure_cached(&inner.world, *address, true, false)?;
        Ok(inner.cache.code(address))
    }

    pub fn address_in_use(&self, address: &Address) -> Result<bool, ExecutionError> {
        let inner = self.inner.read();
        Ok(inner.cache.address_in_use(&inner.world, address)?)
    }

    /// Ordered sequence of transactions applied since the last `rollback`
    /// (`spec.md` §3 "the journal").
    pub fn pending(&self) -> Vec<Transaction> {
        self.inner.read().pending_txs.clone()
    }

    pub fn current_block(&self) -> BlockHeader {
        self.inner.read().current_block.clone()
    }

    pub fn previous_block(&self) -> BlockHeader {
        self.inner.read().previous_block.clone()
    }

    /// The serialized `[header, txs, uncles]` produced by a successful
    /// `mine` (`spec.md` §4.6 `currentBytes`/`blockData()`).
    pub fn block_data(&self) -> Option<Vec<u8>> {
        self.inner.read().sealed_bytes.clone()
    }

    // ---- transaction execution (spec.md §4.3, §4.4) -----------------------

    /// Decodes and applies a single RLP-encoded transaction (`spec.md`
    /// §4.3). Per-transaction failures (`InvalidNonce`, `OutOfGasIntrinsic`,
    /// `InsufficientBalance`) leave the cache exactly as it was — nothing
    /// from this transaction survives.
    pub fn execute(&self, raw_tx: &[u8]) -> Result<(), ExecutionError> {
        let tx = Transaction::decode(raw_tx)?;
        let mut inner = self.inner.write();
        self.execute_locked(&mut inner, tx)
    }

    fn execute_locked(&self, inner: &mut Inner, tx: Transaction) -> Result<(), ExecutionError> {
        let sender = tx.sender().map_err(|_| ExecutionError::InvalidSignature)?;
        inner.cache.ensure_cached(&inner.world, sender, false, false)?;

        let expected_nonce = inner.cache.transactions_from(&sender);
        if expected_nonce != tx.nonce {
            return Err(CoreError::InvalidNonce { expected: expected_nonce, got: tx.nonce }.into());
        }

        let intrinsic = self.config.intrinsic_gas(tx.data.len(), tx.is_creation());
        if tx.gas < intrinsic {
            return Err(CoreError::OutOfGasIntrinsic { gas: tx.gas, intrinsic }.into());
        }

        let upfront = U256::from(tx.gas) * tx.gas_price;
        let checkpoint = inner.cache.checkpoint();
        debug_assert!(checkpoint >= 1);
        if inner.cache.sub_balance(sender, upfront).is_err() {
            let have = inner.cache.balance(&sender);
            inner.cache.revert_to_checkpoint();
            return Err(CoreError::InsufficientBalance { have, need: upfront }.into());
        }
        inner.cache.note_sending(sender);

        let mut gas_remaining = tx.gas - intrinsic;
        let coinbase = inner.current_block.coinbase;
        match tx.to.0 {
            None => {
                let _ = self.create_locked(inner, sender, tx.value, tx.nonce, &mut gas_remaining, &tx.data);
            }
            Some(to) => {
                let mut out = Vec::new();
                let _ =
                    self.call_locked(inner, sender, to, tx.value, &mut gas_remaining, &tx.data, &mut out);
            }
        }

        inner.cache.add_balance(sender, U256::from(gas_remaining) * tx.gas_price);
        let used = tx.gas - gas_remaining;
        inner.cache.add_balance(coinbase, U256::from(used) * tx.gas_price);
        inner.cache.discard_checkpoint();

        let hash = tx.hash();
        inner.pending_txs.push(tx);
        inner.pending_hashes.insert(hash);
        inner.committed_to_mine = false;
        Ok(())
    }

    /// `create(sender, endowment, *gas, code) -> newAddress` (`spec.md`
    /// §4.4). Insufficient gas leaves no account: the checkpoint opened
    /// around the attempt is reverted and all gas is consumed, rather than
    /// propagating a hard error — deployment failure is a normal, included
    /// outcome.
    fn create_locked(
        &self,
        inner: &mut Inner,
        sender: Address,
        endowment: U256,
        sender_nonce: U256,
        gas: &mut u64,
        init_code: &[u8],
    ) -> Address {
        let new_address = compute_create_address(sender, sender_nonce);
        let _ = inner.cache.ensure_cached(&inner.world, new_address, false, true);

        let checkpoint = inner.cache.checkpoint();
        debug_assert!(checkpoint >= 1);

        let deployment_cost = init_code.len() as u64;
        if *gas < deployment_cost {
            warn!(?new_address, "out of gas during contract deployment, no account installed");
            inner.cache.revert_to_checkpoint();
            *gas = 0;
            return new_address;
        }

        let mut host = CacheHost(&mut inner.cache);
        let interpreter = MinimalInterpreter;
        match interpreter.create(&mut host, sender, endowment, init_code, *gas) {
            Ok(outcome) => {
                *gas = gas.saturating_sub(outcome.gas_used);
                if outcome.reverted {
                    inner.cache.revert_to_checkpoint();
                } else {
                    inner.cache.discard_checkpoint();
                }
            }
            Err(_) => {
                inner.cache.revert_to_checkpoint();
                *gas = 0;
            }
        }
        new_address
    }

    /// `call(target, sender, value, *gas, data, out) -> bool` (`spec.md`
    /// §4.4). The value transfer happens unconditionally before any gas
    /// gating, so a plain send with no gas left for code execution still
    /// moves `value` and returns `true`. Returns `false` when `sender`
    /// cannot cover `value`, or the call frame reverted while executing
    /// code; the frame's cache effects are reverted in both cases, but the
    /// transaction itself is still included.
    fn call_locked(
        &self,
        inner: &mut Inner,
        sender: Address,
        target: Address,
        value: U256,
        gas: &mut u64,
        input: &[u8],
        out: &mut Vec<u8>,
    ) -> bool {
        let _ = inner.cache.ensure_cached(&inner.world, target, true, true);

        let checkpoint = inner.cache.checkpoint();
        debug_assert!(checkpoint >= 1);

        if !value.is_zero() && inner.cache.sub_balance(sender, value).is_err() {
            inner.cache.revert_to_checkpoint();
            return false;
        }
        if !value.is_zero() {
            inner.cache.add_balance(target, value);
        }

        if *gas == 0 {
            inner.cache.discard_checkpoint();
            return true;
        }

        let mut host = CacheHost(&mut inner.cache);
        let interpreter = MinimalInterpreter;
        match interpreter.call(&mut host, sender, target, U256::zero(), input, *gas) {
            Ok(outcome) => {
                *gas = gas.saturating_sub(outcome.gas_used);
                let n = outcome.return_data.len().min(out.len().max(outcome.return_data.len()));
                out.clear();
                out.extend_from_slice(&outcome.return_data[..n.min(outcome.return_data.len())]);
                if outcome.reverted {
                    inner.cache.revert_to_checkpoint();
                    false
                } else {
                    inner.cache.discard_checkpoint();
                    true
                }
            }
            Err(_) => {
                inner.cache.revert_to_checkpoint();
                *gas = 0;
                false
            }
        }
    }

    // ---- block playback (spec.md §4.5) ------------------------------------

    /// Decodes and replays a whole block against `parent`'s post-state
    /// (`spec.md` §4.5). Any failure leaves nothing committed: the journal
    /// is rolled back and this `State`'s candidate is left untouched.
    pub fn playback(
        &self,
        block_bytes: &[u8],
        parent: &BlockHeader,
        grand_parent: Option<&BlockHeader>,
        full_commit: bool,
        chain: &dyn ChainView,
    ) -> Result<U256, ChainError> {
        let block = Block::decode(block_bytes).map_err(|e| ChainError::InvalidBlock(e.to_string()))?;
        self.validate_header(&block.header, parent)?;
        self.validate_uncles(&block.uncles, parent, grand_parent, chain)?;

        self.mining_cancel.store(true, Ordering::Relaxed);
        let mut inner = self.inner.write();

        let restore_previous = inner.previous_block.clone();
        let restore_current = inner.current_block.clone();

        inner.cache.clear();
        inner.previous_block = parent.clone();
        inner.current_block = block.header.clone();
        inner.pending_txs.clear();
        inner.pending_hashes.clear();
        inner.committed_to_mine = false;

        let mut world = WorldTrie::open(self.overlay.clone(), parent.state_root);
        let execution_result = (|| -> Result<(), ExecutionError> {
            for tx in &block.transactions {
                inner.cache.ensure_cached(&world, tx.sender().map_err(|_| ExecutionError::InvalidSignature)?, false, false)?;
            }
            // Re-run with the real per-transaction machinery against `world`
            // rather than `inner.world` (kept untouched until we know the
            // block is valid).
            std::mem::swap(&mut inner.world, &mut world);
            for tx in block.transactions.clone() {
                self.execute_locked(&mut inner, tx)?;
            }
            Ok(())
        })();

        if let Err(err) = execution_result {
            std::mem::swap(&mut inner.world, &mut world);
            inner.cache.clear();
            self.overlay.rollback().map_err(ChainError::Store)?;
            inner.previous_block = restore_previous;
            inner.current_block = restore_current;
            return Err(ChainError::Execution(err));
        }

        Self::apply_rewards(&self.config, &mut inner, &block.uncles);

        let root = match inner.cache.commit(&mut inner.world) {
            Ok(root) => root,
            Err(err) => {
                self.overlay.rollback().map_err(ChainError::Store)?;
                inner.previous_block = restore_previous;
                inner.current_block = restore_current;
                return Err(ChainError::Execution(err));
            }
        };

        if root != block.header.state_root {
            self.overlay.rollback().map_err(ChainError::Store)?;
            inner.world = WorldTrie::open(self.overlay.clone(), restore_previous.state_root);
            let expected = block.header.state_root;
            inner.previous_block = restore_previous;
            inner.current_block = restore_current;
            return Err(ChainError::StateRootMismatch { expected, got: root });
        }

        if full_commit {
            self.overlay.commit().map_err(ChainError::Store)?;
            info!(number = block.header.number, ?root, "played back and committed block");
        } else {
            self.overlay.rollback().map_err(ChainError::Store)?;
            inner.world = WorldTrie::open(self.overlay.clone(), restore_previous.state_root);
            inner.previous_block = restore_previous;
            inner.current_block = restore_current;
            debug!(number = block.header.number, "played back block as a trial run, discarded");
        }

        Ok(block.header.difficulty)
    }

    fn validate_header(&self, header: &BlockHeader, parent: &BlockHeader) -> Result<(), ChainError> {
        if header.number != parent.number + 1 {
            return Err(ChainError::InvalidBlock(format!(
                "expected block number {}, got {}",
                parent.number + 1,
                header.number
            )));
        }
        if header.timestamp <= parent.timestamp {
            return Err(ChainError::InvalidBlock("timestamp does not advance past parent".into()));
        }
        let bound = (parent.gas_limit / 1024).max(1);
        if header.gas_limit.abs_diff(parent.gas_limit) > bound {
            return Err(ChainError::InvalidBlock(
                "gas limit delta exceeds the parent-derived bound".into(),
            ));
        }
        let expected = Self::expected_difficulty(parent, header.timestamp);
        if header.difficulty != expected {
            return Err(ChainError::InvalidBlock(format!(
                "difficulty mismatch: expected {expected}, got {}",
                header.difficulty
            )));
        }

        let problem = ProofOfWorkProblem::new(header.seal_hash(), header.difficulty);
        let solution = ProofOfWorkSolution { nonce: header.nonce, mix_hash: header.mix_hash };
        if !validate_pow_solution(&problem, &solution) {
            return Err(ChainError::InvalidBlock("bad nonce (PoW)".into()));
        }
        Ok(())
    }

    /// Simplified retargeting rule (homestead-style): nudge difficulty by
    /// `parent.difficulty / 2048`, up if the block arrived faster than a
    /// 12-second target, down otherwise. `spec.md` §4.5 names "the
    /// retargeting rule" without pinning the exact formula; this is a
    /// deliberate simplification, not the real Ethereum schedule (see
    /// `DESIGN.md`).
    fn expected_difficulty(parent: &BlockHeader, timestamp: u64) -> U256 {
        const TARGET_BLOCK_TIME: u64 = 12;
        let adjust = parent.difficulty / U256::from(2048u64);
        let elapsed = timestamp.saturating_sub(parent.timestamp).max(1);
        if elapsed < TARGET_BLOCK_TIME {
            parent.difficulty + adjust
        } else {
            parent.difficulty.saturating_sub(adjust)
        }
    }

    fn validate_uncles(
        &self,
        uncles: &[BlockHeader],
        parent: &BlockHeader,
        grand_parent: Option<&BlockHeader>,
        chain: &dyn ChainView,
    ) -> Result<(), ChainError> {
        if uncles.len() > self.config.max_uncles {
            return Err(ChainError::TooManyUncles { max: self.config.max_uncles, got: uncles.len() });
        }
        if let Some(grand_parent) = grand_parent {
            if parent.parent_hash != grand_parent.hash() {
                return Err(ChainError::InvalidBlock(
                    "grandParent is not actually parent's parent".into(),
                ));
            }
        }

        let ancestry = chain.ancestors(parent.hash(), chain.genesis_hash());
        let mut seen = std::collections::HashSet::new();
        for uncle in uncles {
            if !seen.insert(uncle.hash()) {
                return Err(ChainError::InvalidUncle);
            }
            if uncle.hash() == parent.hash() || uncle.parent_hash == parent.hash() {
                return Err(ChainError::InvalidUncle);
            }
            let depth = parent.number.saturating_sub(uncle.number);
            if depth == 0 || depth > self.config.max_uncle_depth {
                return Err(ChainError::InvalidUncle);
            }
            if uncle.parent_hash != chain.genesis_hash() && !ancestry.contains(&uncle.parent_hash) {
                return Err(ChainError::InvalidUncle);
            }
        }
        Ok(())
    }

    fn apply_rewards(config: &ChainConfig, inner: &mut Inner, uncles: &[BlockHeader]) {
        let coinbase = inner.current_block.coinbase;
        let uncle_bonus = config.block_reward * U256::from(uncles.len() as u64) / U256::from(32u64);
        inner.cache.add_balance(coinbase, config.block_reward + uncle_bonus);
        let current_number = inner.current_block.number;
        for uncle in uncles {
            let depth = current_number.saturating_sub(uncle.number);
            let reward = config.uncle_reward(depth);
            inner.cache.add_balance(uncle.coinbase, reward);
        }
    }

    // ---- candidate block assembly & mining (spec.md §4.6) ------------------

    /// Freezes the pending transaction set into `currentTxs`/`currentUncles`,
    /// folds the cache into the trie, and applies rewards on top (`spec.md`
    /// §4.6). Idempotent: a second call with no intervening `rollback` is a
    /// no-op.
    pub fn commit_to_mine(&self, chain: &dyn ChainView) -> Result<(), ChainError> {
        self.mining_cancel.store(true, Ordering::Relaxed);
        let mut inner = self.inner.write();
        if inner.committed_to_mine {
            return Ok(());
        }

        inner.current_block.transactions_root = transactions_root(&inner.pending_txs);
        let uncles = self.select_uncles(&inner, chain);
        inner.current_block.uncles_hash = uncles_hash(&uncles);

        let root = inner.cache.commit(&mut inner.world).map_err(ChainError::Execution)?;
        inner.current_block.state_root = root;

        Self::apply_rewards(&self.config, &mut inner, &uncles);

        let root_with_rewards = inner.cache.commit(&mut inner.world).map_err(ChainError::Execution)?;
        inner.current_block.state_root = root_with_rewards;
        inner.pending_uncles = uncles;
        inner.committed_to_mine = true;
        Ok(())
    }

    /// `ChainView` only exposes the canonical chain (`info`/`details`/
    /// `ancestors`), not the sibling blocks a real uncle pool would draw
    /// from, so there is nothing to select from here. A `State` wired to a
    /// collaborator that also tracks non-canonical siblings can still use
    /// `pending_uncles` directly; this engine never fabricates uncles on
    /// its own.
    fn select_uncles(&self, inner: &Inner, chain: &dyn ChainView) -> Vec<BlockHeader> {
        let _ = chain.ancestors(inner.previous_block.hash(), chain.genesis_hash());
        Vec::new()
    }

    /// Runs the proof-of-work search for at most `ms_timeout` milliseconds
    /// against the `commitToMine`-frozen candidate (`spec.md` §4.6 `mine`).
    /// On success, `block_data()` returns the sealed `[header, txs,
    /// uncles]` bytes.
    pub fn mine(&self, ms_timeout: u64) -> Result<MineInfo, ChainError> {
        let (problem, header, txs, uncles) = {
            let inner = self.inner.read();
            if !inner.committed_to_mine {
                return Err(ChainError::NotReadyToMine);
            }
            let header = inner.current_block.clone();
            let problem = ProofOfWorkProblem::new(header.seal_hash(), header.difficulty);
            (problem, header, inner.pending_txs.clone(), inner.pending_uncles.clone())
        };

        self.mining_cancel.store(false, Ordering::Relaxed);
        let info = pow_mine(&problem, Duration::from_millis(ms_timeout), &self.mining_cancel);

        if let Some(solution) = &info.solution {
            let mut sealed_header = header;
            sealed_header.nonce = solution.nonce;
            sealed_header.mix_hash = solution.mix_hash;
            let block = Block { header: sealed_header.clone(), transactions: txs, uncles };
            let mut inner = self.inner.write();
            inner.current_block.nonce = solution.nonce;
            inner.current_block.mix_hash = solution.mix_hash;
            inner.sealed_bytes = Some(block.encode_to_vec());
            info!(number = sealed_header.number, nonce = solution.nonce, "mined block");
        }
        Ok(info)
    }

    // ---- chain synchronization (spec.md §4.7) ------------------------------

    /// Brings the engine to `chain`'s current head (`spec.md` §4.7
    /// `sync(chain)`). A no-op if this engine's `previousBlock` is already
    /// on the canonical chain.
    pub fn sync_to_chain_head(&self, chain: &dyn ChainView) -> Result<(), ChainError> {
        self.mining_cancel.store(true, Ordering::Relaxed);
        let mut inner = self.inner.write();
        let head_hash = chain.current_hash();
        if head_hash == inner.previous_block.hash() {
            return Ok(());
        }
        let head_header = chain.info(head_hash).ok_or(ChainError::ParentNotFound)?;

        inner.cache.clear();
        inner.world = WorldTrie::open(self.overlay.clone(), head_header.state_root);
        inner.current_block = fresh_candidate_header(&head_header);
        inner.previous_block = head_header;
        inner.pending_txs.clear();
        inner.pending_hashes.clear();
        inner.committed_to_mine = false;
        inner.sealed_bytes = None;
        Ok(())
    }

    /// Removes already-applied transactions from `mempool`, then attempts
    /// to re-apply its remaining queued transactions in nonce order,
    /// dropping stale or unaffordable ones (`spec.md` §4.7
    /// `sync(transactionQueue)`). Returns `true` if anything was applied.
    pub fn sync_mempool(&self, mempool: &mut Mempool) -> Result<bool, ExecutionError> {
        let mut inner = self.inner.write();
        for tx in inner.pending_txs.clone() {
            mempool.remove(&tx.hash());
        }

        let mut mutated = false;
        for sender in mempool.senders() {
            inner.cache.ensure_cached(&inner.world, sender, false, false)?;
            for tx in mempool.transactions_from(&sender) {
                let expected = inner.cache.transactions_from(&sender);
                if tx.nonce < expected {
                    mempool.remove(&tx.hash());
                    continue;
                }
                if tx.nonce != expected {
                    break;
                }
                let hash = tx.hash();
                match self.execute_locked(&mut inner, tx) {
                    Ok(()) => {
                        mempool.remove(&hash);
                        mutated = true;
                    }
                    Err(ExecutionError::Core(CoreError::InsufficientBalance { .. })) => {
                        mempool.remove(&hash);
                    }
                    Err(_) => break,
                }
            }
        }
        Ok(mutated)
    }

    /// Read-only variant of `sync_mempool`: drops stale/invalid entries
    /// from `mempool` without touching this engine's state (`spec.md` §4.7
    /// `cull`).
    pub fn cull(&self, mempool: &mut Mempool) {
        let inner = self.inner.read();
        for sender in mempool.senders() {
            let expected = inner.cache.nonce_with_fallback(&inner.world, &sender).unwrap_or_default();
            mempool.drop_stale(&sender, expected);
        }
    }

    /// Discards the in-progress candidate block and every uncommitted
    /// cache mutation, reverting to `previousBlock`'s committed root
    /// (`spec.md` §3 "destruction without commit discards").
    pub fn rollback(&self) {
        self.mining_cancel.store(true, Ordering::Relaxed);
        let mut inner = self.inner.write();
        inner.cache.clear();
        inner.world = WorldTrie::open(self.overlay.clone(), inner.previous_block.state_root);
        inner.current_block = fresh_candidate_header(&inner.previous_block);
        inner.pending_txs.clear();
        inner.pending_hashes.clear();
        inner.committed_to_mine = false;
        inner.sealed_bytes = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_view::test_support::InMemoryChainView;
    use ledger_common::{Genesis, GenesisAccount, TxSignature};
    use ledger_storage::backend::InMemoryBackend;
    use secp256k1::{Keypair, Message, Secp256k1, SecretKey};
    use std::collections::HashMap;

    fn overlay() -> Overlay {
        Overlay::new(Arc::new(InMemoryBackend::new()))
    }

    /// Signs `tx`'s signing hash with `secret_key`, producing a transaction
    /// whose `sender()` recovers to `secret_key`'s address.
    fn sign(tx: &mut Transaction, secret_key: &SecretKey) {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, secret_key);
        let message = Message::from_digest(*tx.signing_hash().as_fixed_bytes());
        let (recovery_id, sig) = secp
            .sign_ecdsa_recoverable(&message, &keypair.secret_key())
            .serialize_compact();
        let r = U256::from_big_endian(&sig[0..32]);
        let s = U256::from_big_endian(&sig[32..64]);
        tx.signature = TxSignature { r, s, recovery_id: recovery_id.to_i32() as u8 };
    }

    fn sender_address(secret_key: &SecretKey) -> Address {
        let secp = Secp256k1::new();
        let public = secp256k1::PublicKey::from_secret_key(&secp, secret_key);
        let hash = ledger_crypto::keccak::keccak_hash(&public.serialize_uncompressed()[1..]);
        Address::from_slice(&hash[12..])
    }

    fn alice_key() -> SecretKey {
        SecretKey::from_slice(&[0x11; 32]).unwrap()
    }

    fn transfer_tx(nonce: u64, value: u64, gas_price: u64, to: Address) -> Transaction {
        Transaction {
            nonce: U256::from(nonce),
            gas_price: U256::from(gas_price),
            gas: 21_000,
            to: To(Some(to)),
            value: U256::from(value),
            data: vec![],
            signature: TxSignature { r: U256::one(), s: U256::one(), recovery_id: 0 },
        }
    }

    fn dev_state() -> (State, Address, Address) {
        let alice = sender_address(&alice_key());
        let bob = Address::from_low_u64_be(0xb);
        let mut alloc = HashMap::new();
        alloc.insert(alice, GenesisAccount::with_balance(U256::from(1_000u64)));
        alloc.insert(bob, GenesisAccount::default());
        let genesis = Genesis {
            difficulty: U256::from(1u64),
            gas_limit: 8_000_000,
            timestamp: 0,
            extra_data: vec![],
            coinbase: Address::zero(),
            alloc,
        };
        let (state, _root) =
            State::from_genesis(overlay(), ChainConfig::test_preset(), &genesis).unwrap();
        (state, alice, bob)
    }

    /// S1: simple transfer, gas_price=0 so balances land on round numbers.
    #[test]
    fn s1_simple_transfer() {
        let (state, alice, bob) = dev_state();
        let mut tx = transfer_tx(0, 100, 0, bob);
        sign(&mut tx, &alice_key());

        state.execute(&tx.encode_to_vec()).unwrap();

        assert_eq!(state.balance(&alice).unwrap(), U256::from(900u64));
        assert_eq!(state.balance(&bob).unwrap(), U256::from(100u64));
        assert_eq!(state.transactions_from(&alice).unwrap(), U256::one());
    }

    /// S2: insufficient balance leaves state unchanged.
    #[test]
    fn s2_insufficient_balance_is_rejected() {
        let (state, alice, bob) = dev_state();
        let root_before = state.root_hash();
        let mut tx = transfer_tx(0, 2000, 0, bob);
        sign(&mut tx, &alice_key());

        let err = state.execute(&tx.encode_to_vec()).unwrap_err();
        assert!(matches!(err, ExecutionError::Core(CoreError::InsufficientBalance { .. })));
        assert_eq!(state.balance(&alice).unwrap(), U256::from(1000u64));
        assert_eq!(state.root_hash(), root_before);
    }

    /// S3: a nonce gap drops the out-of-order transaction; it applies once
    /// the gap is filled.
    #[test]
    fn s3_nonce_gap() {
        let (state, alice, bob) = dev_state();
        let mut tx1 = transfer_tx(1, 10, 0, bob);
        sign(&mut tx1, &alice_key());
        let err = state.execute(&tx1.encode_to_vec()).unwrap_err();
        assert!(matches!(err, ExecutionError::Core(CoreError::InvalidNonce { .. })));

        let mut tx0 = transfer_tx(0, 10, 0, bob);
        sign(&mut tx0, &alice_key());
        state.execute(&tx0.encode_to_vec()).unwrap();
        assert_eq!(state.transactions_from(&alice).unwrap(), U256::one());

        state.execute(&tx1.encode_to_vec()).unwrap();
        assert_eq!(state.transactions_from(&alice).unwrap(), U256::from(2u64));
        assert_eq!(state.balance(&bob).unwrap(), U256::from(20u64));
    }

    /// S4: storage written this session survives commit + reopen.
    #[test]
    fn s4_storage_persists_across_commit_and_reopen() {
        let backend = Arc::new(InMemoryBackend::new());
        let overlay = Overlay::new(backend);
        let contract = Address::from_low_u64_be(0xc);
        let (state, _root) = State::from_genesis(
            overlay.clone(),
            ChainConfig::test_preset(),
            &Genesis {
                difficulty: U256::one(),
                gas_limit: 8_000_000,
                timestamp: 0,
                extra_data: vec![],
                coinbase: Address::zero(),
                alloc: HashMap::new(),
            },
        )
        .unwrap();

        {
            let mut inner = state.inner.write();
            inner.cache.ensure_cached(&inner.world, contract, false, true).unwrap();
        }
        let key = H256::from_low_u64_be(7);
        state.inner.write().cache.set_storage(contract, key, H256::from_low_u64_be(42));
        let root = {
            let mut inner = state.inner.write();
            let r = inner.cache.commit(&mut inner.world).unwrap();
            overlay.commit().unwrap();
            r
        };

        let reopened = State::new(overlay, ChainConfig::test_preset(), {
            let mut h = state.current_block();
            h.state_root = root;
            h
        });
        assert_eq!(reopened.storage(&contract, &key).unwrap(), H256::from_low_u64_be(42));
        assert_eq!(reopened.storage(&contract, &H256::from_low_u64_be(8)).unwrap(), H256::zero());
    }

    /// S5: rollback undoes a run of transfers and restores the prior root.
    #[test]
    fn s5_rollback_restores_prior_root() {
        let (state, alice, bob) = dev_state();
        let root_before = state.root_hash();
        for nonce in 0..5u64 {
            let mut tx = transfer_tx(nonce, 10, 0, bob);
            sign(&mut tx, &alice_key());
            state.execute(&tx.encode_to_vec()).unwrap();
        }
        assert_ne!(state.balance(&alice).unwrap(), U256::from(1000u64));

        state.rollback();
        assert_eq!(state.root_hash(), root_before);
        assert_eq!(state.balance(&alice).unwrap(), U256::from(1000u64));
        assert!(state.pending().is_empty());
    }

    /// S6: mine a block after one transfer, then replay it from genesis on
    /// a fresh `State` and confirm the root matches.
    #[test]
    fn s6_mine_and_replay() {
        let backend = Arc::new(InMemoryBackend::new());
        let overlay = Overlay::new(backend);
        let alice = sender_address(&alice_key());
        let bob = Address::from_low_u64_be(0xb);
        let mut alloc = HashMap::new();
        alloc.insert(alice, GenesisAccount::with_balance(U256::from(1_000u64)));
        let genesis = Genesis {
            difficulty: U256::one(),
            gas_limit: 8_000_000,
            timestamp: 0,
            extra_data: vec![],
            coinbase: Address::zero(),
            alloc,
        };
        let (state, genesis_root) =
            State::from_genesis(overlay.clone(), ChainConfig::test_preset(), &genesis).unwrap();
        let genesis_header = state.previous_block();

        state.set_coinbase(Address::from_low_u64_be(0xf));
        let mut tx = transfer_tx(0, 50, 0, bob);
        sign(&mut tx, &alice_key());
        state.execute(&tx.encode_to_vec()).unwrap();

        let chain = InMemoryChainView::new(genesis_header.hash());
        state.commit_to_mine(&chain).unwrap();
        let mut info = state.mine(50);
        let mut attempts = 0;
        while !info.as_ref().map(|i| i.completed).unwrap_or(false) && attempts < 20 {
            info = state.mine(50);
            attempts += 1;
        }
        let info = info.unwrap();
        assert!(info.completed, "mining should complete quickly at test-preset difficulty");
        let mined_bytes = state.block_data().unwrap();
        let mined_header = state.current_block();

        let fresh = State::new(overlay.clone(), ChainConfig::test_preset(), {
            let mut h = genesis_header.clone();
            h.state_root = genesis_root;
            h
        });
        let difficulty = fresh
            .playback(&mined_bytes, &genesis_header, None, true, &chain)
            .unwrap();
        assert_eq!(difficulty, mined_header.difficulty);
        assert_eq!(fresh.root_hash(), mined_header.state_root);
    }
}
