//! Fixed-depth Poseidon Merkle tree over group commitments.
//!
//! Only the occupied prefix of every level is stored. Nodes to the right of
//! it are roots of empty subtrees and come from a table of zero hashes
//! (`zeros[0] = 0`, `zeros[i + 1] = H(zeros[i], zeros[i])`), so a depth-20
//! tree over a handful of commitments costs a few dozen hashes to build.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::field::FieldElement;
use crate::poseidon::hash2;
use greeter_types::{GreeterError, GreeterResult};

/// Depth of the group tree used by the deployed circuit.
pub const DEFAULT_TREE_DEPTH: usize = 20;

/// Largest supported depth.
pub const MAX_TREE_DEPTH: usize = 32;

/// Inclusion path from a leaf to the root.
///
/// `path_indices[i]` is 1 when the node at level `i` is a right child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The proven commitment.
    pub leaf: FieldElement,
    /// Sibling hashes, leaf level first.
    pub siblings: Vec<FieldElement>,
    /// Direction bits, one per level.
    pub path_indices: Vec<u8>,
    /// Root of the tree the path was taken from.
    pub root: FieldElement,
}

impl MerkleProof {
    /// Path length.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Fold `leaf` up through the siblings.
    pub fn compute_root(&self) -> FieldElement {
        self.siblings
            .iter()
            .zip(&self.path_indices)
            .fold(self.leaf, |node, (sibling, bit)| {
                if *bit == 0 {
                    hash2(node, *sibling)
                } else {
                    hash2(*sibling, node)
                }
            })
    }

    /// Check shape and that the folded root equals `root`.
    pub fn verify(&self) -> bool {
        self.siblings.len() == self.path_indices.len()
            && self.path_indices.iter().all(|b| *b <= 1)
            && self.compute_root() == self.root
    }
}

/// Immutable membership tree built from one snapshot of commitments.
#[derive(Clone, Debug)]
pub struct MembershipTree {
    depth: usize,
    /// `levels[0]` holds the leaves, `levels[depth]` at most the root.
    levels: Vec<Vec<FieldElement>>,
    zeros: Vec<FieldElement>,
    root: FieldElement,
}

impl MembershipTree {
    /// Build at [`DEFAULT_TREE_DEPTH`].
    pub fn build(commitments: &[FieldElement]) -> GreeterResult<Self> {
        Self::build_with_depth(commitments, DEFAULT_TREE_DEPTH)
    }

    /// Build a tree of `depth` levels, padding with the zero sentinel.
    pub fn build_with_depth(commitments: &[FieldElement], depth: usize) -> GreeterResult<Self> {
        if depth == 0 || depth > MAX_TREE_DEPTH {
            return Err(GreeterError::Config(format!(
                "tree depth must be between 1 and {}, got {}",
                MAX_TREE_DEPTH, depth
            )));
        }

        let capacity = capacity_for(depth);
        if commitments.len() as u64 > capacity {
            return Err(GreeterError::TreeOverflow {
                len: commitments.len(),
                capacity: usize::try_from(capacity).unwrap_or(usize::MAX),
            });
        }

        let zeros = zero_hashes(depth);
        let mut levels = Vec::with_capacity(depth + 1);
        levels.push(commitments.to_vec());

        for level in 0..depth {
            let current = &levels[level];
            let next: Vec<FieldElement> = current
                .chunks(2)
                .map(|pair| hash2(pair[0], pair.get(1).copied().unwrap_or(zeros[level])))
                .collect();
            levels.push(next);
        }

        let root = levels[depth].first().copied().unwrap_or(zeros[depth]);

        debug!(
            depth,
            leaves = commitments.len(),
            root = %root,
            "Built membership tree"
        );

        Ok(Self {
            depth,
            levels,
            zeros,
            root,
        })
    }

    /// Current root.
    pub fn root(&self) -> FieldElement {
        self.root
    }

    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of occupied leaves.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    /// Whether no leaf is occupied.
    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Number of leaves the tree can hold.
    pub fn capacity(&self) -> u64 {
        capacity_for(self.depth)
    }

    /// Occupied leaves in index order.
    pub fn leaves(&self) -> &[FieldElement] {
        &self.levels[0]
    }

    /// Lowest index holding `commitment`.
    pub fn leaf_index(&self, commitment: FieldElement) -> Option<usize> {
        self.levels[0].iter().position(|leaf| *leaf == commitment)
    }

    /// Inclusion proof for the first leaf equal to `target`.
    pub fn prove_inclusion(&self, target: FieldElement) -> GreeterResult<MerkleProof> {
        let index = self
            .leaf_index(target)
            .ok_or_else(|| GreeterError::CommitmentNotFound(target.to_string()))?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_indices = Vec::with_capacity(self.depth);
        let mut position = index;

        for level in 0..self.depth {
            let sibling = self.levels[level]
                .get(position ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            siblings.push(sibling);
            path_indices.push((position & 1) as u8);
            position >>= 1;
        }

        Ok(MerkleProof {
            leaf: target,
            siblings,
            path_indices,
            root: self.root,
        })
    }
}

fn capacity_for(depth: usize) -> u64 {
    1u64 << depth
}

fn zero_hashes(depth: usize) -> Vec<FieldElement> {
    let mut zeros = Vec::with_capacity(depth + 1);
    zeros.push(FieldElement::zero());
    for i in 0..depth {
        zeros.push(hash2(zeros[i], zeros[i]));
    }
    zeros
}
