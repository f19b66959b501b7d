//! # ledger (CLI)
//!
//! Thin command-line wrapper around `ledger-blockchain`'s `State`: seed a
//! genesis, play back blocks, assemble and mine a candidate, inspect
//! accounts. Everything the spec actually describes lives in the library
//! crates; this crate only wires them to `std::env::args` (`spec.md` §1:
//! "key management and UI layers" are out of scope beyond this surface).

pub mod chain_store;
pub mod cli;
pub mod initializers;
pub mod networks;

pub const DEFAULT_DATADIR: &str = "ledger-data";
