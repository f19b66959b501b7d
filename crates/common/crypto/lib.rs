//! # ledger-crypto
//!
//! Cryptographic primitives used by the ledger state engine: keccak-256
//! hashing (addresses, trie node hashes, code hashes) and secp256k1
//! signature recovery (transaction sender recovery).
//!
//! The EVM's own precompiles (BN254, BLS12-381, KZG, BLAKE2f, MODEXP, ...)
//! are out of scope here — they belong to the byte-code interpreter, which
//! this engine treats as an external collaborator.

pub mod keccak;
pub mod provider;

pub use provider::{recover_signer, CryptoError};
