//! Transaction Merkle tree root computation.

use std::iter::FromIterator;

use crate::{serialization::sha256d, transaction};

use super::Hash;

/// The root of a block's transaction Merkle tree. Bit-identical to
/// `block::Hash` in representation; kept as a distinct wrapper so a Merkle
/// root can't be passed where a block hash is expected, or vice versa.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Root(pub [u8; 32]);

/// Combine two tree nodes into their parent, via `sha256d(left || right)`.
fn parent_hash(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(&left);
    bytes.extend_from_slice(&right);
    sha256d::sha256d(&bytes)
}

impl FromIterator<transaction::Hash> for Root {
    /// Build a Merkle root the way the reference client does: pad an odd
    /// level by duplicating its last node, and repeat until one hash is
    /// left. An empty transaction set has an all-zero root.
    fn from_iter<T: IntoIterator<Item = transaction::Hash>>(iter: T) -> Self {
        let mut level: Vec<[u8; 32]> = iter.into_iter().map(|hash| hash.0).collect();
        if level.is_empty() {
            return Root([0; 32]);
        }
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                level.push(*level.last().expect("level is non-empty"));
            }
            level = level
                .chunks(2)
                .map(|pair| parent_hash(pair[0], pair[1]))
                .collect();
        }
        Root(level[0])
    }
}

impl From<Root> for Hash {
    fn from(root: Root) -> Hash {
        Hash(root.0)
    }
}

impl From<Hash> for Root {
    fn from(hash: Hash) -> Root {
        Root(hash.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_transaction_root_is_its_own_hash() {
        let tx_hash = transaction::Hash([7u8; 32]);
        let root = Root::from_iter(vec![tx_hash]);
        assert_eq!(root.0, tx_hash.0);
    }

    #[test]
    fn empty_root_is_zero() {
        let root = Root::from_iter(Vec::<transaction::Hash>::new());
        assert_eq!(root.0, [0u8; 32]);
    }
}
