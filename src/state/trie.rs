//! Authenticated key/value trie backing snapshot state.
//!
//! Entries live in a `BTreeMap`, so the Merkle root computed over the sorted
//! entry sequence is a pure function of the entry set: insertion order never
//! affects the root.

use std::collections::BTreeMap;

use crate::merkle::{self, Hash256};

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trie {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merkle root over the sorted entries. Each leaf is the key length
    /// (u64 little-endian) followed by key then value, keeping the leaf
    /// encoding injective.
    pub fn root_hash(&self) -> Hash256 {
        let leaves: Vec<Vec<u8>> = self
            .entries
            .iter()
            .map(|(key, value)| {
                let mut leaf = Vec::with_capacity(8 + key.len() + value.len());
                leaf.extend_from_slice(&(key.len() as u64).to_le_bytes());
                leaf.extend_from_slice(key);
                leaf.extend_from_slice(value);
                leaf
            })
            .collect();
        merkle::root(&leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::EMPTY_ROOT;

    #[test]
    fn empty_trie_root_is_empty_hash() {
        assert_eq!(Trie::new().root_hash(), *EMPTY_ROOT);
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let mut a = Trie::new();
        a.insert(b"alpha".to_vec(), b"1".to_vec());
        a.insert(b"beta".to_vec(), b"2".to_vec());
        a.insert(b"gamma".to_vec(), b"3".to_vec());

        let mut b = Trie::new();
        b.insert(b"gamma".to_vec(), b"3".to_vec());
        b.insert(b"alpha".to_vec(), b"1".to_vec());
        b.insert(b"beta".to_vec(), b"2".to_vec());

        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn root_changes_with_contents() {
        let mut a = Trie::new();
        a.insert(b"k".to_vec(), b"v".to_vec());
        let before = a.root_hash();
        a.insert(b"k".to_vec(), b"w".to_vec());
        assert_ne!(a.root_hash(), before);
        a.remove(b"k");
        assert_eq!(a.root_hash(), *EMPTY_ROOT);
    }

    #[test]
    fn clone_is_structurally_independent() {
        let mut original = Trie::new();
        original.insert(b"k".to_vec(), b"v".to_vec());
        let root = original.root_hash();

        let mut copy = original.clone();
        copy.insert(b"other".to_vec(), b"x".to_vec());
        copy.remove(b"k");

        assert_eq!(original.root_hash(), root);
        assert_eq!(original.get(b"k"), Some(b"v".as_slice()));
    }
}
