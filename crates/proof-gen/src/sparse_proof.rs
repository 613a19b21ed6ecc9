//! Sparse Merkle Proof Generation
//!
//! Builds SSZ Merkle branches without materializing full trees. The
//! validator registry is a `List<Validator, 2^40>`; its data tree has a
//! trillion leaf slots, almost all of which hash to precomputed zero
//! subtree roots. Siblings over the populated prefix are computed on
//! demand, level by level.

use sha2::{Digest, Sha256};

/// Deepest supported subtree.
pub const MAX_DEPTH: usize = 64;

/// Zero-subtree roots by depth: `[0]` is the all-zero leaf,
/// `[d] = H(zh[d-1], zh[d-1])`.
#[must_use]
pub fn zero_hashes() -> Vec<[u8; 32]> {
    let mut hashes = vec![[0u8; 32]; MAX_DEPTH + 1];
    let mut hasher = Sha256::new();
    for depth in 1..=MAX_DEPTH {
        hasher.update(hashes[depth - 1]);
        hasher.update(hashes[depth - 1]);
        hashes[depth] = hasher.finalize_reset().into();
    }
    hashes
}

/// SHA-256 of two concatenated 32-byte nodes.
#[must_use]
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

fn chunk_at(chunks: &[[u8; 32]], index: usize) -> [u8; 32] {
    chunks.get(index).copied().unwrap_or([0u8; 32])
}

/// Root of the subtree of depth `depth` whose leaves start at `start`.
/// Ranges entirely past the populated chunks short-circuit to zero hashes.
fn subtree_root(chunks: &[[u8; 32]], start: usize, depth: usize, zh: &[[u8; 32]]) -> [u8; 32] {
    if depth == 0 {
        return chunk_at(chunks, start);
    }
    if start >= chunks.len() {
        return zh[depth];
    }
    let half = 1usize << (depth - 1);
    let left = subtree_root(chunks, start, depth - 1, zh);
    let right = subtree_root(chunks, start + half, depth - 1, zh);
    hash_pair(&left, &right)
}

/// Merkle branch and root for `chunks[index]` in a tree of depth `depth`.
///
/// Leaf slots past `chunks.len()` are virtual zeros. The branch is ordered
/// leaf-first and has exactly `depth` entries. At level `l` the sibling
/// covers `2^l` leaves; its root is computed sparsely.
pub fn prove_chunks(chunks: &[[u8; 32]], index: usize, depth: u32) -> (Vec<[u8; 32]>, [u8; 32]) {
    let leaf_slots = 1u128 << depth;
    assert!(
        (index as u128) < leaf_slots,
        "chunk index {index} out of range for depth {depth}"
    );

    let zh = zero_hashes();
    let mut branch = Vec::with_capacity(depth as usize);
    let mut pos = index;
    for level in 0..depth {
        let sibling_start = (pos ^ 1) << level;
        branch.push(subtree_root(chunks, sibling_start, level as usize, &zh));
        pos >>= 1;
    }

    let mut acc = chunk_at(chunks, index);
    for (level, sibling) in branch.iter().enumerate() {
        if (index >> level) & 1 == 0 {
            acc = hash_pair(&acc, sibling);
        } else {
            acc = hash_pair(sibling, &acc);
        }
    }

    (branch, acc)
}

/// The length mix-in chunk of a `List`: the little-endian length,
/// zero-padded to 32 bytes.
#[must_use]
pub fn length_chunk(length: usize) -> [u8; 32] {
    let mut chunk = [0u8; 32];
    chunk[..8].copy_from_slice(&(length as u64).to_le_bytes());
    chunk
}

/// `list_root = H(data_root, length_chunk)`.
#[must_use]
pub fn mix_in_length(data_root: [u8; 32], length: usize) -> [u8; 32] {
    hash_pair(&data_root, &length_chunk(length))
}

/// Branch and root for `element_roots[index]` inside a `List` with a data
/// tree of depth `limit_depth`. The branch ends with the length mix-in
/// sibling, so its total length is `limit_depth + 1`.
pub fn prove_list_element(
    element_roots: &[[u8; 32]],
    index: usize,
    limit_depth: u32,
    length: usize,
) -> (Vec<[u8; 32]>, [u8; 32]) {
    let (mut branch, data_root) = prove_chunks(element_roots, index, limit_depth);
    let len_chunk = length_chunk(length);
    branch.push(len_chunk);
    (branch, hash_pair(&data_root, &len_chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_chain() {
        let zh = zero_hashes();
        assert_eq!(zh[0], [0u8; 32]);
        assert_eq!(zh[1], hash_pair(&[0u8; 32], &[0u8; 32]));
        assert_eq!(zh[2], hash_pair(&zh[1], &zh[1]));
        assert_eq!(zh.len(), MAX_DEPTH + 1);
    }

    #[test]
    fn prove_depth_zero_is_the_chunk() {
        let (branch, root) = prove_chunks(&[[42u8; 32]], 0, 0);
        assert!(branch.is_empty());
        assert_eq!(root, [42u8; 32]);
    }

    #[test]
    fn prove_single_populated_leaf() {
        let (branch, root) = prove_chunks(&[[1u8; 32]], 0, 1);
        assert_eq!(branch, vec![[0u8; 32]]);
        assert_eq!(root, hash_pair(&[1u8; 32], &[0u8; 32]));
    }

    #[test]
    fn both_leaves_agree_on_root() {
        let chunks = [[1u8; 32], [2u8; 32]];
        let (branch0, root0) = prove_chunks(&chunks, 0, 1);
        let (branch1, root1) = prove_chunks(&chunks, 1, 1);
        assert_eq!(branch0, vec![[2u8; 32]]);
        assert_eq!(branch1, vec![[1u8; 32]]);
        assert_eq!(root0, root1);
    }

    #[test]
    fn virtual_zero_padding() {
        let chunks = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let zh = zero_hashes();

        let (branch, root) = prove_chunks(&chunks, 0, 2);
        assert_eq!(branch.len(), 2);
        assert_eq!(branch[0], [2u8; 32]);
        assert_eq!(branch[1], hash_pair(&[3u8; 32], &zh[0]));

        let mut acc = [1u8; 32];
        acc = hash_pair(&acc, &branch[0]);
        acc = hash_pair(&acc, &branch[1]);
        assert_eq!(acc, root);
    }

    #[test]
    fn deep_sparse_tree_uses_zero_hashes() {
        let chunks = [[0xaa; 32], [0xbb; 32]];
        let (branch, _root) = prove_chunks(&chunks, 0, 40);
        assert_eq!(branch.len(), 40);
        assert_eq!(branch[0], [0xbb; 32]);
        let zh = zero_hashes();
        for (level, sibling) in branch.iter().enumerate().skip(1) {
            assert_eq!(sibling, &zh[level], "level {level}");
        }
    }

    #[test]
    fn list_element_branch_carries_length() {
        let elements = [[0xaa; 32], [0xbb; 32]];
        let (branch, list_root) = prove_list_element(&elements, 0, 2, 2);

        assert_eq!(branch.len(), 3);
        assert_eq!(branch[2], length_chunk(2));

        let (_, data_root) = prove_chunks(&elements, 0, 2);
        assert_eq!(list_root, mix_in_length(data_root, 2));
    }

    #[test]
    fn mix_in_length_changes_root() {
        let data_root = [7u8; 32];
        assert_ne!(mix_in_length(data_root, 1), mix_in_length(data_root, 2));
    }
}
