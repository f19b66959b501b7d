//! Trie node shapes and their RLP encoding.
//!
//! This implementation always stores children by hash reference (no small-node
//! inlining), trading a little storage density for a much simpler recursive
//! walk — acceptable at this engine's scope (`spec.md` §2 budgets the trie at
//! 15% of the core).

use ethereum_types::H256;
use ledger_rlp::decode::RLPDecode;
use ledger_rlp::encode::RLPEncode;
use ledger_rlp::error::RLPDecodeError;
use ledger_rlp::structs::{Decoder, Encoder};

use crate::nibbles::Nibbles;

pub const BRANCH_WIDTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf { path: Nibbles, value: Vec<u8> },
    Extension { path: Nibbles, child: H256 },
    Branch { children: Box<[Option<H256>; BRANCH_WIDTH]>, value: Option<Vec<u8>> },
}

impl Node {
    pub fn new_branch() -> Self {
        Node::Branch {
            children: Box::new([None; BRANCH_WIDTH]),
            value: None,
        }
    }

    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Node::Leaf { path, value } => {
                Encoder::new(&mut buf)
                    .encode_field(&path.encode_compact(true))
                    .encode_field(value)
                    .finish();
            }
            Node::Extension { path, child } => {
                Encoder::new(&mut buf)
                    .encode_field(&path.encode_compact(false))
                    .encode_field(child)
                    .finish();
            }
            Node::Branch { children, value } => {
                let mut enc = Encoder::new(&mut buf);
                for child in children.iter() {
                    let bytes: Vec<u8> = child.map(|h| h.as_bytes().to_vec()).unwrap_or_default();
                    enc = enc.encode_field(&bytes);
                }
                let value_bytes: Vec<u8> = value.clone().unwrap_or_default();
                enc.encode_field(&value_bytes).finish();
            }
        }
        buf
    }

    pub fn decode_raw(bytes: &[u8]) -> Result<Self, RLPDecodeError> {
        // Peek the list arity by counting top-level items.
        let decoder = Decoder::new(bytes)?;
        let mut probe = decoder;
        let mut count = 0;
        loop {
            if probe.is_done() {
                break;
            }
            let (_item, next): (Vec<u8>, _) = probe.get_encoded_item()?;
            probe = next;
            count += 1;
        }

        if count == 2 {
            let decoder = Decoder::new(bytes)?;
            let (compact, decoder) = decoder.decode_field::<Vec<u8>>("path")?;
            let (path, is_leaf) = Nibbles::decode_compact(&compact);
            if is_leaf {
                let (value, decoder) = decoder.decode_field::<Vec<u8>>("value")?;
                decoder.finish()?;
                Ok(Node::Leaf { path, value })
            } else {
                let (child, decoder) = decoder.decode_field::<H256>("child")?;
                decoder.finish()?;
                Ok(Node::Extension { path, child })
            }
        } else if count == BRANCH_WIDTH + 1 {
            let mut decoder = Decoder::new(bytes)?;
            let mut children: Box<[Option<H256>; BRANCH_WIDTH]> =
                Box::new([None; BRANCH_WIDTH]);
            for slot in children.iter_mut() {
                let (raw, next) = decoder.decode_field::<Vec<u8>>("branch_child")?;
                *slot = if raw.is_empty() {
                    None
                } else {
                    Some(H256::from_slice(&raw))
                };
                decoder = next;
            }
            let (raw_value, decoder) = decoder.decode_field::<Vec<u8>>("branch_value")?;
            decoder.finish()?;
            let value = if raw_value.is_empty() { None } else { Some(raw_value) };
            Ok(Node::Branch { children, value })
        } else {
            Err(RLPDecodeError::malformed_data())
        }
    }
}
