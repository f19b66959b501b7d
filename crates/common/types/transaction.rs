//! Transaction shape (`spec.md` §3 `Transaction`, §4.3, §4.4).

use ethereum_types::{Address, H256, U256};
use ledger_crypto::keccak::keccak_hash;
use ledger_crypto::{recover_signer, CryptoError};
use ledger_rlp::decode::{decode_bytes, RLPDecode};
use ledger_rlp::encode::RLPEncode;
use ledger_rlp::error::RLPDecodeError;
use ledger_rlp::structs::{Decoder, Encoder};

/// `r || s || v` ECDSA signature over the transaction's signing hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub r: U256,
    pub s: U256,
    /// Recovery id, 0 or 1 (legacy `v` minus its chain-id offset).
    pub recovery_id: u8,
}

impl TxSignature {
    pub fn to_bytes(self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0..32].copy_from_slice(&self.r.to_big_endian());
        out[32..64].copy_from_slice(&self.s.to_big_endian());
        out[64] = self.recovery_id;
        out
    }
}

impl RLPEncode for TxSignature {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.r)
            .encode_field(&self.s)
            .encode_field(&self.recovery_id)
            .finish();
    }
}

impl RLPDecode for TxSignature {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (r, decoder) = decoder.decode_field("r")?;
        let (s, decoder) = decoder.decode_field("s")?;
        let (recovery_id, decoder) = decoder.decode_field("recovery_id")?;
        let rest = decoder.finish()?;
        Ok((Self { r, s, recovery_id }, rest))
    }
}

/// `to = None` is a contract-creation transaction (`spec.md` §3); encoded as
/// an empty RLP byte string rather than omitted, so it always occupies a
/// fixed slot in the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct To(pub Option<Address>);

impl RLPEncode for To {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self.0 {
            Some(addr) => addr.encode(buf),
            None => [].as_slice().encode(buf),
        }
    }

    fn length(&self) -> usize {
        match self.0 {
            Some(addr) => addr.length(),
            None => [].as_slice().length(),
        }
    }
}

impl RLPDecode for To {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.is_empty() {
            Ok((To(None), rest))
        } else {
            Ok((To(Some(Address::from_slice(bytes))), rest))
        }
    }
}

/// `(nonce, gasPrice, gas, to, value, data, signature)` (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas: u64,
    pub to: To,
    pub value: U256,
    pub data: Vec<u8>,
    pub signature: TxSignature,
}

impl Transaction {
    pub fn is_creation(&self) -> bool {
        self.to.0.is_none()
    }

    /// Hash of the unsigned fields — the message signed to produce `signature`.
    pub fn signing_hash(&self) -> H256 {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .finish();
        H256::from(keccak_hash(buf))
    }

    /// Hash of the fully-encoded (signed) transaction — used for the
    /// pending-list dedup set (`spec.md` §4.3 step 8).
    pub fn hash(&self) -> H256 {
        H256::from(keccak_hash(self.encode_to_vec()))
    }

    /// Recovers the sender address from `signature` over `signing_hash`.
    pub fn sender(&self) -> Result<Address, CryptoError> {
        recover_signer(&self.signature.to_bytes(), self.signing_hash().as_fixed_bytes())
    }
}

impl RLPEncode for Transaction {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.nonce)
            .encode_field(&self.gas_price)
            .encode_field(&self.gas)
            .encode_field(&self.to)
            .encode_field(&self.value)
            .encode_field(&self.data)
            .encode_field(&self.signature)
            .finish();
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (gas_price, decoder) = decoder.decode_field("gas_price")?;
        let (gas, decoder) = decoder.decode_field("gas")?;
        let (to, decoder) = decoder.decode_field("to")?;
        let (value, decoder) = decoder.decode_field("value")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (signature, decoder) = decoder.decode_field("signature")?;
        let rest = decoder.finish()?;
        Ok((Self { nonce, gas_price, gas, to, value, data, signature }, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            nonce: U256::zero(),
            gas_price: U256::from(1u8),
            gas: 21_000,
            to: To(Some(Address::from_low_u64_be(0xb))),
            value: U256::from(100u8),
            data: vec![],
            signature: TxSignature { r: U256::from(1u8), s: U256::from(2u8), recovery_id: 0 },
        }
    }

    #[test]
    fn rlp_roundtrip() {
        let tx = sample();
        let encoded = tx.encode_to_vec();
        assert_eq!(Transaction::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn creation_to_roundtrips_as_none() {
        let mut tx = sample();
        tx.to = To(None);
        let encoded = tx.encode_to_vec();
        let decoded = Transaction::decode(&encoded).unwrap();
        assert!(decoded.is_creation());
    }

    #[test]
    fn hash_is_deterministic() {
        let tx = sample();
        assert_eq!(tx.hash(), tx.hash());
    }
}
