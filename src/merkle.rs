//! Merkle tree builder used for transaction and state roots.
//!
//! The tree over an ordered leaf sequence is a deterministic binary format:
//! the split point at every interior node is the largest power of two
//! strictly below the leaf count, so the left subtree is always perfectly
//! balanced. Block headers commit to this exact hash, so the shape is part
//! of the wire contract, not an implementation detail.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::error::{ChainError, Result};

pub type Hash256 = [u8; 32];

/// Domain-separation prefix hashed before a leaf item.
pub const LEAF_PREFIX: u8 = 0x00;
/// Domain-separation prefix hashed before two child roots.
pub const INTERIOR_PREFIX: u8 = 0x01;

/// Root of the empty leaf sequence.
pub static EMPTY_ROOT: Lazy<Hash256> = Lazy::new(|| Sha256::digest([]).into());

/// Which side of the hash concatenation an audit hash occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof: a sibling subtree root plus the side it
/// sits on when the parent hash is recomputed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuditHash {
    pub hash: Hash256,
    pub side: Side,
}

fn leaf_hash(item: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(item);
    hasher.finalize().into()
}

fn interior_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update([INTERIOR_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Largest power of two strictly less than `n`. Caller guarantees `n >= 2`.
fn prev_power_of_two(n: usize) -> usize {
    debug_assert!(n >= 2);
    1 << (usize::BITS - 1 - (n - 1).leading_zeros())
}

/// Root hash of an ordered leaf sequence.
///
/// Built iteratively: leaves are pushed onto a stack of (root, leaf-count)
/// pairs, equal-sized neighbors merge immediately, and the leftovers fold
/// right to left. This produces exactly the recursive
/// `H(0x01 ‖ root(items[..k]) ‖ root(items[k..]))` definition with
/// `k = prev_power_of_two(len)`, without recursion.
pub fn root<T: AsRef<[u8]>>(items: &[T]) -> Hash256 {
    if items.is_empty() {
        return *EMPTY_ROOT;
    }

    // (subtree root, leaf count); counts on the stack strictly decrease
    // toward the top except while merging.
    let mut stack: Vec<(Hash256, usize)> = Vec::new();
    for item in items {
        stack.push((leaf_hash(item.as_ref()), 1));
        while stack.len() >= 2 && stack[stack.len() - 1].1 == stack[stack.len() - 2].1 {
            let (right, n) = stack.pop().unwrap();
            let (left, _) = stack.pop().unwrap();
            stack.push((interior_hash(&left, &right), n * 2));
        }
    }

    let (mut acc, _) = stack.pop().unwrap();
    while let Some((left, _)) = stack.pop() {
        acc = interior_hash(&left, &acc);
    }
    acc
}

/// Authentication path from leaf `index` to the root, ordered leaf-to-root.
///
/// A single-leaf sequence yields an empty proof. An out-of-range index is an
/// error, never a silent truncation.
pub fn proof<T: AsRef<[u8]>>(items: &[T], index: usize) -> Result<Vec<AuditHash>> {
    if index >= items.len() {
        return Err(ChainError::ProofIndexOutOfRange { index, len: items.len() });
    }

    // Walk top-down narrowing to the half that holds `index`, recording the
    // other half's root; emit in reverse so the deepest sibling comes first.
    let mut path: Vec<AuditHash> = Vec::new();
    let mut lo = 0usize;
    let mut hi = items.len();
    while hi - lo > 1 {
        let k = prev_power_of_two(hi - lo);
        if index < lo + k {
            path.push(AuditHash { hash: root(&items[lo + k..hi]), side: Side::Right });
            hi = lo + k;
        } else {
            path.push(AuditHash { hash: root(&items[lo..lo + k]), side: Side::Left });
            lo += k;
        }
    }
    debug_assert_eq!(lo, index);

    path.reverse();
    Ok(path)
}

/// Fold an audit path from a leaf back up to a candidate root.
pub fn verify(item: &[u8], path: &[AuditHash], expected: &Hash256) -> bool {
    let mut acc = leaf_hash(item);
    for audit in path {
        acc = match audit.side {
            Side::Left => interior_hash(&audit.hash, &acc),
            Side::Right => interior_hash(&acc, &audit.hash),
        };
    }
    acc == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h_leaf(item: &[u8]) -> Hash256 {
        leaf_hash(item)
    }

    fn h_node(l: &Hash256, r: &Hash256) -> Hash256 {
        interior_hash(l, r)
    }

    #[test]
    fn empty_root_is_hash_of_nothing() {
        let expected: Hash256 = Sha256::digest([]).into();
        assert_eq!(root::<&[u8]>(&[]), expected);
        assert_eq!(root::<&[u8]>(&[]), *EMPTY_ROOT);
    }

    #[test]
    fn single_leaf_root_is_prefixed_leaf_hash() {
        assert_eq!(root(&[b"a"]), h_leaf(b"a"));
    }

    #[test]
    fn three_leaves_split_power_of_two_left() {
        // left = ["a","b"], right = ["c"]
        let ab = h_node(&h_leaf(b"a"), &h_leaf(b"b"));
        let expected = h_node(&ab, &h_leaf(b"c"));
        assert_eq!(root(&[b"a", b"b", b"c"]), expected);
    }

    #[test]
    fn iterative_root_matches_recursive_definition() {
        fn recursive(items: &[Vec<u8>]) -> Hash256 {
            match items.len() {
                0 => *EMPTY_ROOT,
                1 => leaf_hash(&items[0]),
                n => {
                    let k = prev_power_of_two(n);
                    interior_hash(&recursive(&items[..k]), &recursive(&items[k..]))
                }
            }
        }

        for n in 0..40usize {
            let items: Vec<Vec<u8>> = (0..n).map(|i| format!("leaf-{i}").into_bytes()).collect();
            assert_eq!(root(&items), recursive(&items), "leaf count {n}");
        }
    }

    #[test]
    fn proof_round_trips_for_all_indices() {
        for n in 1..=17usize {
            let items: Vec<Vec<u8>> = (0..n).map(|i| format!("item-{i}").into_bytes()).collect();
            let r = root(&items);
            for i in 0..n {
                let path = proof(&items, i).unwrap();
                assert!(verify(&items[i], &path, &r), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn single_leaf_proof_is_empty() {
        assert!(proof(&[b"only"], 0).unwrap().is_empty());
    }

    #[test]
    fn proof_rejects_out_of_range_index() {
        let items = [b"a".to_vec(), b"b".to_vec()];
        assert!(matches!(
            proof(&items, 2),
            Err(ChainError::ProofIndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(proof::<Vec<u8>>(&[], 0).is_err());
    }

    #[test]
    fn proof_does_not_verify_against_wrong_leaf() {
        let items = [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let r = root(&items);
        let path = proof(&items, 1).unwrap();
        assert!(!verify(b"x", &path, &r));
    }
}
