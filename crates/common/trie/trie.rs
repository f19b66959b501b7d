//! # ledger-trie
//!
//! Authenticated Merkle-Patricia trie mapping variable-length byte keys to
//! byte-string values, hashed into a single 32-byte root. Nodes are always
//! referenced by hash (no small-node inlining), and live in an abstract
//! [`TrieDB`] — the engine binds that to its `Overlay` (`ledger-storage`).

pub mod db;
pub mod error;
pub mod nibbles;
pub mod node;

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use ethereum_types::H256;
use ledger_crypto::keccak::keccak_hash;
use ledger_rlp::constants::RLP_NULL;

pub use db::{InMemoryTrieDB, TrieDB};
pub use error::TrieError;
pub use nibbles::Nibbles;
pub use node::Node;

/// keccak(RLP_NULL) — the canonical hash of an empty trie.
pub fn empty_trie_hash() -> H256 {
    H256::from(keccak_hash([RLP_NULL]))
}

/// Authenticated Merkle-Patricia trie over an abstract [`TrieDB`].
pub struct Trie {
    db: Arc<dyn TrieDB>,
    root: Option<H256>,
    /// Nodes created since the last `commit`, keyed by hash. Flushed to the
    /// backing `TrieDB` on `commit`; dropped on `Drop` without commit.
    pending: RefCell<HashMap<H256, Node>>,
}

impl Trie {
    /// A fresh, empty trie.
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self { db, root: None, pending: RefCell::new(HashMap::new()) }
    }

    /// Reopen a trie at a previously committed root.
    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Self {
        let root = if root == empty_trie_hash() { None } else { Some(root) };
        Self { db, root, pending: RefCell::new(HashMap::new()) }
    }

    pub fn root(&self) -> H256 {
        self.root.unwrap_or_else(empty_trie_hash)
    }

    fn get_node(&self, hash: H256) -> Result<Node, TrieError> {
        if let Some(node) = self.pending.borrow().get(&hash) {
            return Ok(node.clone());
        }
        let bytes = self
            .db
            .get(hash.as_bytes())?
            .ok_or(TrieError::MissingNode(hash))?;
        Ok(Node::decode_raw(&bytes)?)
    }

    fn put_node(&self, node: Node) -> H256 {
        let raw = node.encode_raw();
        let hash = H256::from(keccak_hash(&raw));
        self.pending.borrow_mut().insert(hash, node);
        hash
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TrieError> {
        let path = Nibbles::from_bytes(key);
        self.get_at(self.root, &path)
    }

    fn get_at(&self, node_hash: Option<H256>, path: &Nibbles) -> Result<Option<Vec<u8>>, TrieError> {
        let Some(hash) = node_hash else { return Ok(None) };
        match self.get_node(hash)? {
            Node::Leaf { path: lp, value } => {
                Ok(if &lp == path { Some(value) } else { None })
            }
            Node::Extension { path: ep, child } => {
                if path.common_prefix_len(&ep) == ep.len() {
                    self.get_at(Some(child), &path.skip(ep.len()))
                } else {
                    Ok(None)
                }
            }
            Node::Branch { children, value } => {
                if path.is_empty() {
                    Ok(value)
                } else {
                    let nib = path.first().expect("checked non-empty") as usize;
                    self.get_at(children[nib], &path.skip(1))
                }
            }
        }
    }

    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), TrieError> {
        let path = Nibbles::from_bytes(key);
        let new_hash = self.insert_at(self.root, path, value)?;
        self.root = Some(new_hash);
        Ok(())
    }

    fn insert_at(&self, node_hash: Option<H256>, path: Nibbles, value: Vec<u8>) -> Result<H256, TrieError> {
        let Some(hash) = node_hash else {
            return Ok(self.put_node(Node::Leaf { path, value }));
        };
        let node = self.get_node(hash)?;
        match node {
            Node::Leaf { path: lp, value: lv } => {
                if lp == path {
                    return Ok(self.put_node(Node::Leaf { path, value }));
                }
                Ok(self.split_into_branch(lp, lv, path, value)?)
            }
            Node::Extension { path: ep, child } => {
                let common = path.common_prefix_len(&ep);
                if common == ep.len() {
                    let new_child = self.insert_at(Some(child), path.skip(common), value)?;
                    Ok(self.put_node(Node::Extension { path: ep, child: new_child }))
                } else {
                    self.split_extension(ep, child, common, path, value)
                }
            }
            Node::Branch { mut children, value: bvalue } => {
                if path.is_empty() {
                    Ok(self.put_node(Node::Branch { children, value: Some(value) }))
                } else {
                    let nib = path.first().expect("checked non-empty") as usize;
                    let new_child = self.insert_at(children[nib], path.skip(1), value)?;
                    children[nib] = Some(new_child);
                    Ok(self.put_node(Node::Branch { children, value: bvalue }))
                }
            }
        }
    }

    /// Splits two diverging leaves (`lp`/`lv` already in the trie, `np`/`nv`
    /// the new insert) into a branch, wrapped in an extension if they share
    /// a common prefix.
    fn split_into_branch(&self, lp: Nibbles, lv: Vec<u8>, np: Nibbles, nv: Vec<u8>) -> Result<H256, TrieError> {
        let common = lp.common_prefix_len(&np);
        let lp_rest = lp.skip(common);
        let np_rest = np.skip(common);
        let mut branch = Node::new_branch();
        let Node::Branch { children, value } = &mut branch else { unreachable!() };

        if lp_rest.is_empty() {
            *value = Some(lv);
        } else {
            let nib = lp_rest.first().expect("checked non-empty") as usize;
            children[nib] = Some(self.put_node(Node::Leaf { path: lp_rest.skip(1), value: lv }));
        }
        if np_rest.is_empty() {
            *value = Some(nv);
        } else {
            let nib = np_rest.first().expect("checked non-empty") as usize;
            children[nib] = Some(self.put_node(Node::Leaf { path: np_rest.skip(1), value: nv }));
        }

        let branch_hash = self.put_node(branch);
        if common > 0 {
            Ok(self.put_node(Node::Extension { path: lp.prefix(common), child: branch_hash }))
        } else {
            Ok(branch_hash)
        }
    }

    /// Splits an extension node that diverges from the insert path at
    /// `common` nibbles.
    fn split_extension(
        &self,
        ep: Nibbles,
        child: H256,
        common: usize,
        path: Nibbles,
        value: Vec<u8>,
    ) -> Result<H256, TrieError> {
        let ep_rest = ep.skip(common);
        let path_rest = path.skip(common);
        let mut branch = Node::new_branch();
        let Node::Branch { children, value: bvalue } = &mut branch else { unreachable!() };

        let ep_nib = ep_rest.first().expect("extension splits at < its own length") as usize;
        children[ep_nib] = Some(if ep_rest.len() == 1 {
            child
        } else {
            self.put_node(Node::Extension { path: ep_rest.skip(1), child })
        });

        if path_rest.is_empty() {
            *bvalue = Some(value);
        } else {
            let nib = path_rest.first().expect("checked non-empty") as usize;
            children[nib] = Some(self.put_node(Node::Leaf { path: path_rest.skip(1), value }));
        }

        let branch_hash = self.put_node(branch);
        if common > 0 {
            Ok(self.put_node(Node::Extension { path: ep.prefix(common), child: branch_hash }))
        } else {
            Ok(branch_hash)
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<(), TrieError> {
        let path = Nibbles::from_bytes(key);
        self.root = self.remove_at(self.root, path)?;
        Ok(())
    }

    fn remove_at(&self, node_hash: Option<H256>, path: Nibbles) -> Result<Option<H256>, TrieError> {
        let Some(hash) = node_hash else { return Ok(None) };
        let node = self.get_node(hash)?;
        match node {
            Node::Leaf { path: lp, .. } => {
                if lp == path {
                    Ok(None)
                } else {
                    Ok(Some(hash))
                }
            }
            Node::Extension { path: ep, child } => {
                if path.common_prefix_len(&ep) != ep.len() {
                    return Ok(Some(hash));
                }
                match self.remove_at(Some(child), path.skip(ep.len()))? {
                    None => Ok(None),
                    Some(new_child) if new_child == child => Ok(Some(hash)),
                    Some(new_child) => Ok(Some(self.merge_extension(ep, new_child)?)),
                }
            }
            Node::Branch { children, value } => {
                if path.is_empty() {
                    if value.is_none() {
                        return Ok(Some(hash));
                    }
                    self.collapse_branch(children, None)
                } else {
                    let nib = path.first().expect("checked non-empty") as usize;
                    let Some(existing) = children[nib] else { return Ok(Some(hash)) };
                    match self.remove_at(Some(existing), path.skip(1))? {
                        Some(new_child) if new_child == existing => Ok(Some(hash)),
                        new_child => {
                            let mut children = children;
                            children[nib] = new_child;
                            self.collapse_branch(children, value)
                        }
                    }
                }
            }
        }
    }

    /// Merges an extension's path with its (possibly now-terminal) child,
    /// keeping the trie canonical (no extension pointing to another
    /// extension, no branch with a single child and no value).
    fn merge_extension(&self, prefix: Nibbles, child: H256) -> Result<H256, TrieError> {
        match self.get_node(child)? {
            Node::Leaf { path, value } => Ok(self.put_node(Node::Leaf { path: prefix.concat(&path), value })),
            Node::Extension { path, child } => {
                Ok(self.put_node(Node::Extension { path: prefix.concat(&path), child }))
            }
            Node::Branch { .. } => Ok(self.put_node(Node::Extension { path: prefix, child })),
        }
    }

    fn collapse_branch(
        &self,
        children: Box<[Option<H256>; node::BRANCH_WIDTH]>,
        value: Option<Vec<u8>>,
    ) -> Result<Option<H256>, TrieError> {
        let present: Vec<usize> = children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|_| i))
            .collect();

        if present.is_empty() {
            return Ok(match value {
                Some(value) => Some(self.put_node(Node::Leaf { path: Nibbles::default(), value })),
                None => None,
            });
        }
        if present.len() == 1 && value.is_none() {
            let idx = present[0];
            let child = children[idx].expect("present");
            return Ok(Some(match self.get_node(child)? {
                Node::Leaf { path, value } => {
                    self.put_node(Node::Leaf { path: path.prepend(idx as u8), value })
                }
                Node::Extension { path, child } => {
                    self.put_node(Node::Extension { path: path.prepend(idx as u8), child })
                }
                Node::Branch { .. } => {
                    self.put_node(Node::Extension { path: Nibbles::from_nibbles(vec![idx as u8]), child })
                }
            }));
        }
        Ok(Some(self.put_node(Node::Branch { children, value })))
    }

    /// Flushes every node created since the last commit to the backing
    /// `TrieDB` in a single batch and returns the new root.
    pub fn commit(&mut self) -> Result<H256, TrieError> {
        let pending = self.pending.take();
        let batch = pending
            .into_iter()
            .map(|(hash, node)| (hash.as_bytes().to_vec(), node.encode_raw()))
            .collect();
        self.db.put_batch(batch)?;
        Ok(self.root())
    }

    /// Collects every `(key_bytes, value)` pair in the trie. Used by state
    /// dumps and tests; not optimized for large tries.
    pub fn iter(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TrieError> {
        let mut out = Vec::new();
        self.collect_at(self.root, Nibbles::default(), &mut out)?;
        Ok(out)
    }

    fn collect_at(&self, node_hash: Option<H256>, prefix: Nibbles, out: &mut Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), TrieError> {
        let Some(hash) = node_hash else { return Ok(()) };
        match self.get_node(hash)? {
            Node::Leaf { path, value } => {
                out.push((nibbles_to_bytes(&prefix.concat(&path)), value));
            }
            Node::Extension { path, child } => {
                self.collect_at(Some(child), prefix.concat(&path), out)?;
            }
            Node::Branch { children, value } => {
                if let Some(value) = value {
                    out.push((nibbles_to_bytes(&prefix), value));
                }
                for (i, child) in children.iter().enumerate() {
                    self.collect_at(*child, prefix.concat(&Nibbles::from_nibbles(vec![i as u8])), out)?;
                }
            }
        }
        Ok(())
    }

    /// Collects the RLP-encoded nodes visited while looking up `key`: a
    /// Merkle proof of inclusion (or of the deepest divergence, for
    /// exclusion).
    pub fn get_proof(&self, key: &[u8]) -> Result<Vec<Vec<u8>>, TrieError> {
        let mut proof = Vec::new();
        let mut current = self.root;
        let mut path = Nibbles::from_bytes(key);
        while let Some(hash) = current {
            let node = self.get_node(hash)?;
            proof.push(node.encode_raw());
            match node {
                Node::Leaf { .. } => break,
                Node::Extension { path: ep, child } => {
                    if path.common_prefix_len(&ep) != ep.len() {
                        break;
                    }
                    path = path.skip(ep.len());
                    current = Some(child);
                }
                Node::Branch { children, .. } => {
                    if path.is_empty() {
                        break;
                    }
                    let nib = path.first().expect("checked non-empty") as usize;
                    path = path.skip(1);
                    current = children[nib];
                }
            }
        }
        Ok(proof)
    }
}

fn nibbles_to_bytes(nibbles: &Nibbles) -> Vec<u8> {
    debug_assert_eq!(nibbles.len() % 2, 0, "trie keys are always whole bytes");
    nibbles
        .as_slice()
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn new_trie() -> Trie {
        Trie::new(Arc::new(InMemoryTrieDB::new()))
    }

    #[test]
    fn empty_trie_has_canonical_hash() {
        let trie = new_trie();
        assert_eq!(trie.root(), empty_trie_hash());
    }

    #[test]
    fn insert_get_single() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"cat").unwrap(), None);
    }

    #[test]
    fn insert_many_and_commit_reopen() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"doge", b"coin".to_vec()).unwrap();
        trie.insert(b"horse", b"stallion".to_vec()).unwrap();
        let db = trie.db.clone();
        let root = trie.commit().unwrap();

        let reopened = Trie::open(db, root);
        assert_eq!(reopened.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(reopened.get(b"doge").unwrap(), Some(b"coin".to_vec()));
        assert_eq!(reopened.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
    }

    #[test]
    fn update_existing_key() {
        let mut trie = new_trie();
        trie.insert(b"k", b"v1".to_vec()).unwrap();
        trie.insert(b"k", b"v2".to_vec()).unwrap();
        assert_eq!(trie.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn remove_restores_empty_root() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.remove(b"dog").unwrap();
        assert_eq!(trie.root(), empty_trie_hash());
        assert_eq!(trie.get(b"dog").unwrap(), None);
    }

    #[test]
    fn remove_one_of_many_keeps_others() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"doge", b"coin".to_vec()).unwrap();
        trie.insert(b"horse", b"stallion".to_vec()).unwrap();
        trie.remove(b"doge").unwrap();
        assert_eq!(trie.get(b"doge").unwrap(), None);
        assert_eq!(trie.get(b"dog").unwrap(), Some(b"puppy".to_vec()));
        assert_eq!(trie.get(b"horse").unwrap(), Some(b"stallion".to_vec()));
    }

    #[test]
    fn iter_collects_all_entries() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"horse", b"stallion".to_vec()).unwrap();
        let mut entries = trie.iter().unwrap();
        entries.sort();
        assert_eq!(
            entries,
            vec![(b"dog".to_vec(), b"puppy".to_vec()), (b"horse".to_vec(), b"stallion".to_vec())]
        );
    }

    #[test]
    fn proof_contains_the_leaf_for_present_key() {
        let mut trie = new_trie();
        trie.insert(b"dog", b"puppy".to_vec()).unwrap();
        trie.insert(b"doge", b"coin".to_vec()).unwrap();
        let proof = trie.get_proof(b"dog").unwrap();
        assert!(!proof.is_empty());
    }
}
