//! Keccak-256 hashing, backed by the portable `sha3` crate.

use sha3::{Digest, Keccak256 as Sha3Keccak256};

/// Single-shot keccak-256.
pub fn keccak_hash(data: impl AsRef<[u8]>) -> [u8; 32] {
    Sha3Keccak256::digest(data.as_ref()).into()
}

/// Streaming keccak-256 hasher.
#[derive(Clone, Default)]
pub struct Keccak256 {
    inner: Sha3Keccak256,
}

impl Keccak256 {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> Self {
        Digest::update(&mut self.inner, data.as_ref());
        self.clone()
    }

    #[inline]
    pub fn finalize(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}
