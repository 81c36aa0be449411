// Merkle Tree - flat-array hash tree over ordered leaves
//
// Layout: one contiguous buffer holding every level, leaves first.
//
//   size  = 2^depth, depth = ceil(log2(n))
//   level k (0 = leaves) holds (size >> k) nodes
//   level k starts at offset(k) = 2*size - 2*(size >> k)
//   total length = 2*size - 1, root at the last slot
//
// Leaf slots [n, size) are padding and hold ZERO_HASH.

use crate::proof::encoding::{hash, hash_pair, HashBytes, ZERO_HASH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from tree construction and proof generation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("No leaves provided")]
    EmptyInput,

    #[error("Leaf not found in tree")]
    NotFound,

    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// Inclusion proof for one leaf
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Sibling hashes ordered from the leaf level up to just below the root
    pub hashes: Vec<HashBytes>,
    /// Position of the leaf among the leaves
    pub index: u64,
}

impl Proof {
    /// Verify this proof for `leaf` against `root`
    pub fn verify(&self, leaf: &[u8], root: &HashBytes) -> bool {
        verify_proof(leaf, &self.hashes, self.index, root)
    }
}

/// Merkle tree stored as a flat array of node hashes
#[derive(Clone, Debug)]
pub struct MerkleTree {
    nodes: Vec<HashBytes>,
    leaf_count: usize,
    size: usize,
    depth: u32,
}

impl MerkleTree {
    /// Build a tree over the given leaves, in order
    pub fn build<L: AsRef<[u8]>>(leaves: &[L]) -> Result<Self, ProofError> {
        if leaves.is_empty() {
            return Err(ProofError::EmptyInput);
        }

        let leaf_count = leaves.len();
        let size = leaf_count.next_power_of_two();
        let depth = size.trailing_zeros();

        let mut nodes = Vec::with_capacity(2 * size - 1);
        nodes.extend(leaves.iter().map(|leaf| hash(leaf.as_ref())));
        nodes.resize(size, ZERO_HASH);

        for level in 0..depth {
            let start = Self::level_offset(size, level);
            let width = size >> level;
            for i in (0..width).step_by(2) {
                let parent = hash_pair(&nodes[start + i], &nodes[start + i + 1]);
                nodes.push(parent);
            }
        }

        debug_assert_eq!(nodes.len(), 2 * size - 1);

        Ok(Self {
            nodes,
            leaf_count,
            size,
            depth,
        })
    }

    /// First slot of `level` in the flat buffer
    fn level_offset(size: usize, level: u32) -> usize {
        2 * size - 2 * (size >> level)
    }

    /// The root hash
    pub fn root(&self) -> HashBytes {
        self.nodes[self.nodes.len() - 1]
    }

    /// Number of real (non-padding) leaves
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of leaf slots including padding
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of levels above the leaves
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Hash of the leaf at `index`
    pub fn leaf_hash(&self, index: usize) -> Option<HashBytes> {
        (index < self.leaf_count).then(|| self.nodes[index])
    }

    /// Position of the first leaf whose contents hash matches
    pub fn index_of(&self, leaf: &[u8]) -> Option<usize> {
        let target = hash(leaf);
        self.nodes[..self.leaf_count]
            .iter()
            .position(|node| *node == target)
    }

    /// Proof for the first leaf with these contents
    pub fn proof(&self, leaf: &[u8]) -> Result<Proof, ProofError> {
        let index = self.index_of(leaf).ok_or(ProofError::NotFound)?;
        self.proof_at(index)
    }

    /// Proof for the leaf at a given position
    pub fn proof_at(&self, index: usize) -> Result<Proof, ProofError> {
        if index >= self.leaf_count {
            return Err(ProofError::NotFound);
        }

        let mut hashes = Vec::with_capacity(self.depth as usize);
        let mut position = index;
        for level in 0..self.depth {
            let start = Self::level_offset(self.size, level);
            let sibling = if position % 2 == 0 {
                position + 1
            } else {
                position - 1
            };
            hashes.push(self.nodes[start + sibling]);
            position /= 2;
        }

        Ok(Proof {
            hashes,
            index: index as u64,
        })
    }
}

/// Verify an inclusion proof without a tree
///
/// Combination order follows the parity of the running index: an even index
/// means the running hash is the left operand. Never errors; any mismatch,
/// including an index that does not fit in `hashes.len()` levels, is `false`.
pub fn verify_proof(leaf: &[u8], hashes: &[HashBytes], index: u64, root: &HashBytes) -> bool {
    if hashes.len() < 64 && index >> hashes.len() != 0 {
        return false;
    }

    let mut current = hash(leaf);
    let mut position = index;
    for sibling in hashes {
        current = if position % 2 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
        position /= 2;
    }

    current == *root
}

/// Root of a leaf list
pub fn root_of<L: AsRef<[u8]>>(leaves: &[L]) -> Result<HashBytes, ProofError> {
    Ok(MerkleTree::build(leaves)?.root())
}

/// Proof of `leaf` within a leaf list
pub fn proof_of<L: AsRef<[u8]>>(leaves: &[L], leaf: &[u8]) -> Result<Proof, ProofError> {
    MerkleTree::build(leaves)?.proof(leaf)
}
