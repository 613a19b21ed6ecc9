//! Mutable Sparse Merkle Tree
//!
//! A node-addressed tree used to patch unmaterialized branches before
//! reading a proof off the result. The finalized state stores each
//! historical summary's `block_summary_root` as a bare leaf; proving a
//! block root *below* that leaf requires grafting the real `block_roots`
//! subtree (from the summary-span state) onto that position first.
//!
//! Subtrees past the populated data collapse to `Zero(depth)` nodes whose
//! roots come from the precomputed zero-hash table, so a depth-24 list
//! tree with a few thousand entries stays small.

use crate::gindex::gindex_depth;
use crate::sparse_proof::{hash_pair, zero_hashes, MAX_DEPTH};
use thiserror::Error;

/// Errors from tree navigation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("gindex {0} is deeper than the subtree it addresses")]
    PathThroughLeaf(u64),
    #[error("gindex {gindex} exceeds subtree depth {depth}")]
    DepthExceeded { gindex: u64, depth: u32 },
    #[error("subtree depth {0} exceeds the supported maximum")]
    TooDeep(u32),
}

/// A sparse binary Merkle tree node.
#[derive(Debug, Clone)]
pub enum Tree {
    /// An all-zero subtree of the given depth.
    Zero(u32),
    /// A 32-byte leaf (or an opaque subtree root not descended into).
    Leaf([u8; 32]),
    /// An interior node.
    Node { left: Box<Tree>, right: Box<Tree> },
}

impl Tree {
    /// Build a depth-`depth` tree over the given leaf chunks; slots past
    /// `chunks.len()` become `Zero` subtrees.
    #[must_use]
    pub fn from_chunks(chunks: &[[u8; 32]], depth: u32) -> Self {
        Self::from_chunks_at(chunks, 0, depth)
    }

    fn from_chunks_at(chunks: &[[u8; 32]], start: usize, depth: u32) -> Self {
        if depth == 0 {
            return match chunks.get(start) {
                Some(chunk) => Tree::Leaf(*chunk),
                None => Tree::Zero(0),
            };
        }
        if start >= chunks.len() {
            return Tree::Zero(depth);
        }
        let half = 1usize << (depth - 1);
        Tree::Node {
            left: Box::new(Self::from_chunks_at(chunks, start, depth - 1)),
            right: Box::new(Self::from_chunks_at(chunks, start + half, depth - 1)),
        }
    }

    /// Depth of this subtree. `Leaf` is depth 0 regardless of what it
    /// summarizes.
    #[must_use]
    pub fn depth(&self) -> u32 {
        match self {
            Tree::Zero(d) => *d,
            Tree::Leaf(_) => 0,
            Tree::Node { left, .. } => left.depth() + 1,
        }
    }

    /// Merkle root of this subtree.
    #[must_use]
    pub fn root(&self) -> [u8; 32] {
        self.root_with(&zero_hashes())
    }

    fn root_with(&self, zh: &[[u8; 32]]) -> [u8; 32] {
        match self {
            Tree::Zero(d) => zh[(*d as usize).min(MAX_DEPTH)],
            Tree::Leaf(chunk) => *chunk,
            Tree::Node { left, right } => hash_pair(&left.root_with(zh), &right.root_with(zh)),
        }
    }

    /// Replace the node at `gindex` (relative to this tree's root) with
    /// `subtree`. `Zero` interior positions are expanded on the way down;
    /// descending *through* a `Leaf` is an error — a leaf can be replaced
    /// but not traversed.
    pub fn set_node(&mut self, gindex: u64, subtree: Tree) -> Result<(), TreeError> {
        if gindex == 0 {
            return Err(TreeError::PathThroughLeaf(gindex));
        }
        let depth = gindex_depth(gindex);
        self.set_node_walk(gindex, depth, subtree)
    }

    fn set_node_walk(&mut self, gindex: u64, depth: u32, subtree: Tree) -> Result<(), TreeError> {
        if depth == 0 {
            *self = subtree;
            return Ok(());
        }
        // Expand zero interiors so navigation can continue.
        if let Tree::Zero(d) = self {
            if *d == 0 {
                return Err(TreeError::PathThroughLeaf(gindex));
            }
            let child = Tree::Zero(*d - 1);
            *self = Tree::Node {
                left: Box::new(child.clone()),
                right: Box::new(child),
            };
        }
        match self {
            Tree::Leaf(_) => Err(TreeError::PathThroughLeaf(gindex)),
            Tree::Node { left, right } => {
                let bit = (gindex >> (depth - 1)) & 1;
                let child = if bit == 0 { left } else { right };
                child.set_node_walk(gindex, depth - 1, subtree)
            }
            Tree::Zero(_) => unreachable!("zero interiors expanded above"),
        }
    }

    /// Sibling branch (leaf-first) for the node at `gindex`.
    pub fn single_proof(&self, gindex: u64) -> Result<Vec<[u8; 32]>, TreeError> {
        if gindex == 0 {
            return Err(TreeError::PathThroughLeaf(gindex));
        }
        let depth = gindex_depth(gindex);
        let zh = zero_hashes();
        let mut branch = Vec::with_capacity(depth as usize);
        self.collect_branch(gindex, depth, &zh, &mut branch)?;
        branch.reverse();
        Ok(branch)
    }

    fn collect_branch(
        &self,
        gindex: u64,
        depth: u32,
        zh: &[[u8; 32]],
        branch: &mut Vec<[u8; 32]>,
    ) -> Result<(), TreeError> {
        if depth == 0 {
            return Ok(());
        }
        match self {
            Tree::Leaf(_) => Err(TreeError::PathThroughLeaf(gindex)),
            Tree::Zero(d) => {
                if *d < depth {
                    return Err(TreeError::DepthExceeded { gindex, depth });
                }
                // Every sibling below an all-zero subtree is a zero hash.
                for level in (0..depth).rev() {
                    branch.push(zh[(*d - depth + level) as usize]);
                }
                Ok(())
            }
            Tree::Node { left, right } => {
                let bit = (gindex >> (depth - 1)) & 1;
                let (child, sibling) = if bit == 0 {
                    (left, right)
                } else {
                    (right, left)
                };
                branch.push(sibling.root_with(zh));
                child.collect_branch(gindex, depth - 1, zh, branch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse_proof::prove_chunks;

    fn chunk(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn root_matches_sparse_prover() {
        let chunks = [chunk(1), chunk(2), chunk(3)];
        let tree = Tree::from_chunks(&chunks, 3);
        let (_, expected) = prove_chunks(&chunks, 0, 3);
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn zero_tree_root_is_zero_hash() {
        let zh = zero_hashes();
        assert_eq!(Tree::Zero(0).root(), zh[0]);
        assert_eq!(Tree::Zero(13).root(), zh[13]);
        assert_eq!(Tree::from_chunks(&[], 13).root(), zh[13]);
    }

    #[test]
    fn single_proof_matches_sparse_prover() {
        let chunks = [chunk(1), chunk(2), chunk(3), chunk(4), chunk(5)];
        let tree = Tree::from_chunks(&chunks, 3);

        for index in 0..5usize {
            let branch = tree.single_proof(8 + index as u64).expect("proof");
            let (expected, _) = prove_chunks(&chunks, index, 3);
            assert_eq!(branch, expected, "leaf {index}");
        }
    }

    #[test]
    fn single_proof_through_virtual_zeros() {
        let chunks = [chunk(9)];
        let tree = Tree::from_chunks(&chunks, 4);
        // leaf slot 13 lives in an entirely zero subtree
        let branch = tree.single_proof(16 + 13).expect("proof");
        let (expected, _) = prove_chunks(&chunks, 13, 4);
        assert_eq!(branch, expected);
    }

    #[test]
    fn set_node_replaces_leaf_and_updates_root() {
        let chunks = [chunk(1), chunk(2)];
        let mut tree = Tree::from_chunks(&chunks, 1);
        let before = tree.root();

        tree.set_node(3, Tree::Leaf(chunk(7))).expect("set");
        let after = tree.root();

        assert_ne!(before, after);
        let (_, expected) = prove_chunks(&[chunk(1), chunk(7)], 0, 1);
        assert_eq!(after, expected);
    }

    #[test]
    fn set_node_grafts_subtree_below_leaf_position() {
        // A depth-1 container holding two opaque roots; graft a real
        // depth-2 subtree where the left leaf was.
        let inner_chunks = [chunk(5), chunk(6), chunk(7), chunk(8)];
        let inner = Tree::from_chunks(&inner_chunks, 2);
        let inner_root = inner.root();

        let mut container = Tree::from_chunks(&[inner_root, chunk(9)], 1);
        let root_before = container.root();
        container.set_node(2, inner).expect("graft");

        // Grafting the subtree whose root equals the leaf preserves the root.
        assert_eq!(container.root(), root_before);

        // And now the proof can descend below the grafted position.
        let branch = container.single_proof(0b1_0_10).expect("proof");
        assert_eq!(branch.len(), 3);
        let mut acc = inner_chunks[2];
        acc = hash_pair(&acc, &branch[0]);
        acc = hash_pair(&branch[1], &acc);
        acc = hash_pair(&acc, &branch[2]);
        assert_eq!(acc, root_before);
    }

    #[test]
    fn set_node_expands_zero_interior() {
        let mut tree = Tree::Zero(3);
        tree.set_node(8, Tree::Leaf(chunk(1))).expect("set");
        let (_, expected) = prove_chunks(&[chunk(1)], 0, 3);
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn descending_through_leaf_fails() {
        let mut tree = Tree::from_chunks(&[chunk(1), chunk(2)], 1);
        let err = tree.set_node(4, Tree::Leaf(chunk(3))).unwrap_err();
        assert!(matches!(err, TreeError::PathThroughLeaf(_)));

        let tree = Tree::from_chunks(&[chunk(1), chunk(2)], 1);
        assert!(tree.single_proof(4).is_err());
    }
}
