//! # ledger-miner
//!
//! Proof-of-work problem/solution types and the cancellable mining search
//! loop (`spec.md` §4.6, §5). The teacher (`ethrex`) is post-merge and
//! carries no PoW miner of its own; this crate is grounded instead in
//! MAZZE's `crates/mazzecore/core/src/pow/mod.rs` (`ProofOfWorkProblem`,
//! difficulty/boundary conversion) and `crates/blockgen/src/lib.rs` (the
//! bounded, sleep-sliced `loop { ...; if stop { break } }` mining shape).
//!
//! `spec.md` §4.6 names the Dagger/Hashimoto PoW family but only actually
//! specifies the *loop* contract the rest of the engine depends on: bounded
//! time slices, sub-millisecond cancellation polling, and a
//! `{completed, requiredEffort, bestSoFar}` result. The exact hash family is
//! swappable (see `DESIGN.md`); this crate implements a keccak-based
//! boundary check rather than a literal memory-hard cache.

pub mod pow;

pub use pow::{
    boundary_to_difficulty, difficulty_to_boundary, mine, validate_solution, MineInfo,
    ProofOfWorkProblem, ProofOfWorkSolution,
};
