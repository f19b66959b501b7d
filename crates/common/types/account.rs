//! The per-address account record (`spec.md` §3 `AddressState`, §6.4).

use ethereum_types::{H256, U256};
use ledger_crypto::keccak::keccak_hash;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use ledger_rlp::error::RLPDecodeError;
use ledger_rlp::structs::{Decoder, Encoder};
use ledger_trie::empty_trie_hash;

/// Canonical committed state of an address: the four fields the world trie
/// stores, RLP-encoded, under the address key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub nonce: U256,
    pub balance: U256,
    pub storage_root: H256,
    pub code_hash: H256,
}

impl Account {
    /// keccak of the empty byte string — the code hash of every
    /// externally-owned account.
    pub fn empty_code_hash() -> H256 {
        H256::from(keccak_hash([]))
    }

    /// Root of an empty storage trie.
    pub fn empty_storage_root() -> H256 {
        empty_trie_hash()
    }

    /// A brand-new externally-owned account: zero nonce and balance, no
    /// code, no storage.
    pub fn new_empty() -> Self {
        Self {
            nonce: U256::zero(),
            balance: U256::zero(),
            storage_root: Self::empty_storage_root(),
            code_hash: Self::empty_code_hash(),
        }
    }

    /// `spec.md` §3: "an account with nonce=0, balance=0, empty storage,
    /// empty code is indistinguishable from absent" — used by `commit` to
    /// decide whether a touched-but-untouched account should be removed
    /// from the trie rather than inserted.
    pub fn is_empty(&self) -> bool {
        self.nonce.is_zero()
            && self.balance.is_zero()
            && self.storage_root == Self::empty_storage_root()
            && self.code_hash == Self::empty_code_hash()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new_empty()
    }
}

impl RLPEncode for Account {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.balance)
            .encode_field(&self.nonce)
            .encode_field(&self.storage_root)
            .encode_field(&self.code_hash)
            .finish();
    }
}

impl RLPDecode for Account {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (balance, decoder) = decoder.decode_field("balance")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (storage_root, decoder) = decoder.decode_field("storage_root")?;
        let (code_hash, decoder) = decoder.decode_field("code_hash")?;
        let rest = decoder.finish()?;
        Ok((Self { nonce, balance, storage_root, code_hash }, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_empty_account_is_empty() {
        assert!(Account::new_empty().is_empty());
    }

    #[test]
    fn rlp_roundtrip() {
        let account = Account {
            nonce: U256::from(3u8),
            balance: U256::from(1000u32),
            storage_root: Account::empty_storage_root(),
            code_hash: Account::empty_code_hash(),
        };
        let encoded = account.encode_to_vec();
        let decoded = Account::decode(&encoded).unwrap();
        assert_eq!(account, decoded);
    }
}
