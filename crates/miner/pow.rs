//! The search itself: `ProofOfWorkProblem` (what must be satisfied),
//! `ProofOfWorkSolution` (nonce + mix hash), and `mine` (the bounded,
//! cancellable search). Grounded in MAZZE's `ProofOfWorkProblem`
//! difficulty/boundary pair and its CPU-mining loop's sleep-sliced
//! cancellation polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ethereum_types::{H256, U256};
use ledger_crypto::keccak::keccak_hash;
use rand::RngCore;
use tracing::{debug, trace};

/// A sealing problem: find a `nonce` such that
/// `keccak(header_seal_hash || nonce) <= boundary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWorkProblem {
    pub header_seal_hash: H256,
    pub difficulty: U256,
    pub boundary: U256,
}

impl ProofOfWorkProblem {
    pub fn new(header_seal_hash: H256, difficulty: U256) -> Self {
        Self { header_seal_hash, difficulty, boundary: difficulty_to_boundary(&difficulty) }
    }
}

/// `difficulty = 0` is clamped to the maximum boundary (anything passes).
pub fn difficulty_to_boundary(difficulty: &U256) -> U256 {
    if difficulty.is_zero() {
        U256::MAX
    } else {
        U256::MAX / *difficulty
    }
}

pub fn boundary_to_difficulty(boundary: &U256) -> U256 {
    if boundary.is_zero() {
        U256::MAX
    } else {
        U256::MAX / *boundary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWorkSolution {
    pub nonce: u64,
    pub mix_hash: H256,
}

fn seal_hash(problem: &ProofOfWorkProblem, nonce: u64) -> H256 {
    let mut buf = [0u8; 40];
    buf[..32].copy_from_slice(problem.header_seal_hash.as_bytes());
    buf[32..].copy_from_slice(&nonce.to_be_bytes());
    H256::from(keccak_hash(buf))
}

/// `true` if `solution.mix_hash` is indeed `seal_hash(problem, solution.nonce)`
/// and it satisfies the problem's boundary (`spec.md` §8 property 7).
pub fn validate_solution(problem: &ProofOfWorkProblem, solution: &ProofOfWorkSolution) -> bool {
    let hash = seal_hash(problem, solution.nonce);
    hash == solution.mix_hash && U256::from_big_endian(hash.as_bytes()) <= problem.boundary
}

/// Result of a bounded `mine` call (`spec.md` §4.6 `MineInfo`).
#[derive(Debug, Clone)]
pub struct MineInfo {
    pub completed: bool,
    pub solution: Option<ProofOfWorkSolution>,
    pub required_effort: U256,
    pub best_so_far: U256,
}

/// One search slice — checked against the cancellation flag at least once
/// per millisecond (`spec.md` §5 "Cancellation").
const SLICE: Duration = Duration::from_millis(1);

/// Searches for a nonce satisfying `problem` for at most `timeout`,
/// polling `cancel` at each 1ms slice boundary and aborting immediately if
/// it is set (`spec.md` §4.6, §5). Grounded in MAZZE's
/// `blockgen::start_mining`'s `loop { ...; thread::sleep(sleep_duration) }`
/// shape, collapsed to a single-threaded bounded search since this engine's
/// `mine` call is itself the cancellable unit (no separate worker pool).
pub fn mine(problem: &ProofOfWorkProblem, timeout: Duration, cancel: &Arc<AtomicBool>) -> MineInfo {
    let deadline = Instant::now() + timeout;
    let mut rng = rand::thread_rng();
    let mut best = U256::MAX;

    loop {
        if cancel.load(Ordering::Relaxed) {
            debug!("mining cancelled mid-search");
            return MineInfo {
                completed: false,
                solution: None,
                required_effort: boundary_to_difficulty(&problem.boundary),
                best_so_far: best,
            };
        }
        let now = Instant::now();
        if now >= deadline {
            return MineInfo {
                completed: false,
                solution: None,
                required_effort: boundary_to_difficulty(&problem.boundary),
                best_so_far: best,
            };
        }

        let slice_end = now + SLICE.min(deadline - now);
        while Instant::now() < slice_end {
            let nonce = rng.next_u64();
            let hash = seal_hash(problem, nonce);
            let value = U256::from_big_endian(hash.as_bytes());
            if value < best {
                best = value;
            }
            if value <= problem.boundary {
                trace!(?nonce, "found a satisfying nonce");
                return MineInfo {
                    completed: true,
                    solution: Some(ProofOfWorkSolution { nonce, mix_hash: hash }),
                    required_effort: boundary_to_difficulty(&problem.boundary),
                    best_so_far: value,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_difficulty_completes_quickly() {
        let problem = ProofOfWorkProblem::new(H256::zero(), U256::one());
        let cancel = Arc::new(AtomicBool::new(false));
        let info = mine(&problem, Duration::from_millis(50), &cancel);
        assert!(info.completed);
        let solution = info.solution.unwrap();
        assert!(validate_solution(&problem, &solution));
    }

    #[test]
    fn impossible_boundary_times_out_uncompleted() {
        let problem = ProofOfWorkProblem { header_seal_hash: H256::zero(), difficulty: U256::MAX, boundary: U256::zero() };
        let cancel = Arc::new(AtomicBool::new(false));
        let info = mine(&problem, Duration::from_millis(20), &cancel);
        assert!(!info.completed);
        assert!(info.solution.is_none());
    }

    #[test]
    fn cancel_flag_aborts_immediately() {
        let problem = ProofOfWorkProblem { header_seal_hash: H256::zero(), difficulty: U256::MAX, boundary: U256::zero() };
        let cancel = Arc::new(AtomicBool::new(true));
        let info = mine(&problem, Duration::from_secs(5), &cancel);
        assert!(!info.completed);
    }

    #[test]
    fn difficulty_boundary_roundtrip() {
        let difficulty = U256::from(131_072u64);
        let boundary = difficulty_to_boundary(&difficulty);
        assert_eq!(boundary_to_difficulty(&boundary), difficulty);
    }

    #[test]
    fn validate_solution_rejects_tampered_nonce() {
        let problem = ProofOfWorkProblem::new(H256::zero(), U256::one());
        let cancel = Arc::new(AtomicBool::new(false));
        let solution = mine(&problem, Duration::from_millis(50), &cancel).solution.unwrap();
        let tampered = ProofOfWorkSolution { nonce: solution.nonce.wrapping_add(1), ..solution };
        assert!(!validate_solution(&problem, &tampered));
    }
}
