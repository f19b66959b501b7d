//! Block header/body shapes (`spec.md` §3 `BlockInfo`, §6.3).

use ethereum_types::{Address, H256, U256};
use ledger_crypto::keccak::keccak_hash;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use ledger_rlp::error::RLPDecodeError;
use ledger_rlp::structs::{Decoder, Encoder};

use crate::types::transaction::Transaction;

/// `[parentHash, unclesHash, coinbase, stateRoot, transactionsRoot,
/// difficulty, number, gasLimit, timestamp, extraData, nonce, mixHash]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub parent_hash: H256,
    pub uncles_hash: H256,
    pub coinbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    pub nonce: u64,
    pub mix_hash: H256,
}

impl BlockHeader {
    pub fn hash(&self) -> H256 {
        H256::from(keccak_hash(self.encode_to_vec()))
    }

    /// Hash of every header field except `nonce`/`mixHash` — the value a
    /// proof-of-work search is actually performed against (`spec.md` §4.6).
    /// `nonce`/`mixHash` are the two fields the search produces.
    pub fn seal_hash(&self) -> H256 {
        let mut buf = Vec::new();
        Encoder::new(&mut buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.uncles_hash)
            .encode_field(&self.coinbase)
            .encode_field(&self.state_root)
            .encode_field(&self.transactions_root)
            .encode_field(&self.difficulty)
            .encode_field(&self.number)
            .encode_field(&self.gas_limit)
            .encode_field(&self.timestamp)
            .encode_field(&self.extra_data)
            .finish();
        H256::from(keccak_hash(buf))
    }
}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.parent_hash)
            .encode_field(&self.uncles_hash)
            .encode_field(&self.coinbase)
            .encode_field(&self.state_root)
            .encode_field(&self.transactions_root)
            .encode_field(&self.difficulty)
            .encode_field(&self.number)
            .encode_field(&self.gas_limit)
            .encode_field(&self.timestamp)
            .encode_field(&self.extra_data)
            .encode_field(&self.nonce)
            .encode_field(&self.mix_hash)
            .finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (parent_hash, decoder) = decoder.decode_field("parent_hash")?;
        let (uncles_hash, decoder) = decoder.decode_field("uncles_hash")?;
        let (coinbase, decoder) = decoder.decode_field("coinbase")?;
        let (state_root, decoder) = decoder.decode_field("state_root")?;
        let (transactions_root, decoder) = decoder.decode_field("transactions_root")?;
        let (difficulty, decoder) = decoder.decode_field("difficulty")?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (timestamp, decoder) = decoder.decode_field("timestamp")?;
        let (extra_data, decoder) = decoder.decode_field("extra_data")?;
        let (nonce, decoder) = decoder.decode_field("nonce")?;
        let (mix_hash, decoder) = decoder.decode_field("mix_hash")?;
        let rest = decoder.finish()?;
        Ok((
            Self {
                parent_hash,
                uncles_hash,
                coinbase,
                state_root,
                transactions_root,
                difficulty,
                number,
                gas_limit,
                timestamp,
                extra_data,
                nonce,
                mix_hash,
            },
            rest,
        ))
    }
}

/// `[header, transactions, uncles]` (`spec.md` §6.3). `uncles` is itself a
/// list of headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<BlockHeader>,
}

impl RLPEncode for Block {
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        Encoder::new(buf)
            .encode_field(&self.header)
            .encode_field(&self.transactions)
            .encode_field(&self.uncles)
            .finish();
    }
}

impl RLPDecode for Block {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (header, decoder) = decoder.decode_field("header")?;
        let (transactions, decoder) = decoder.decode_field("transactions")?;
        let (uncles, decoder) = decoder.decode_field("uncles")?;
        let rest = decoder.finish()?;
        Ok((Self { header, transactions, uncles }, rest))
    }
}

/// keccak of the RLP-encoded list of uncle headers (`spec.md` §4.6).
pub fn uncles_hash(uncles: &[BlockHeader]) -> H256 {
    H256::from(keccak_hash(uncles.to_vec().encode_to_vec()))
}

/// keccak of the RLP-encoded list of transactions (`spec.md` §4.6).
pub fn transactions_root(transactions: &[Transaction]) -> H256 {
    H256::from(keccak_hash(transactions.to_vec().encode_to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            parent_hash: H256::zero(),
            uncles_hash: uncles_hash(&[]),
            coinbase: Address::zero(),
            state_root: H256::zero(),
            transactions_root: transactions_root(&[]),
            difficulty: U256::from(131_072u64),
            number: 1,
            gas_limit: 8_000_000,
            timestamp: 0,
            extra_data: vec![],
            nonce: 0,
            mix_hash: H256::zero(),
        }
    }

    #[test]
    fn header_rlp_roundtrip() {
        let header = sample_header();
        let encoded = header.encode_to_vec();
        assert_eq!(BlockHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn hash_is_deterministic() {
        let header = sample_header();
        assert_eq!(header.hash(), header.hash());
    }

    #[test]
    fn seal_hash_ignores_nonce_and_mix_hash() {
        let mut header = sample_header();
        let seal = header.seal_hash();
        header.nonce = 0xdead_beef;
        header.mix_hash = H256::repeat_byte(0x42);
        assert_eq!(header.seal_hash(), seal);
        assert_ne!(header.hash(), seal);
    }
}
