//! Exit-Delay Merkle Proof Builders
//!
//! Two proof shapes leave this module:
//!
//! 1. `ValidatorProofBuilder` proves `validators[i]` (the whole container
//!    root) against a beacon state root.
//! 2. `HistoricalProofBuilder` proves that a block root appears inside
//!    `historical_summaries[s].block_summary_root` of the finalized state,
//!    descending through a patched copy of the summary container whose
//!    `block_summary_root` leaf has been replaced by the materialized
//!    `block_roots` subtree of the summary-span state.
//!
//! Every proof is re-verified locally before it is returned. A local
//! verification failure means the tree layout is wrong, not that the
//! network misbehaved, so it is terminal for the payload.

use crate::beacon_state::BeaconStateView;
use crate::gindex::{concat_gindices, gindex_depth, StateSchema};
use crate::sparse_proof::{hash_pair, prove_chunks, prove_list_element};
use crate::tree::{Tree, TreeError};
use ssz_rs::prelude::*;
use thiserror::Error;

/// Errors from proof construction.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("validator index {0} out of bounds (count {1})")]
    ValidatorOutOfBounds(u64, usize),

    #[error("historical summary index {0} out of bounds (count {1})")]
    SummaryOutOfBounds(u64, usize),

    #[error("block-root index {0} out of bounds (vector length {1})")]
    RootOutOfBounds(u64, usize),

    #[error("SSZ merkleization failed: {0}")]
    Merkleization(#[from] MerkleizationError),

    /// A structural bug: the emitted branch does not reproduce the root.
    #[error("proof internal error: {0}")]
    Internal(String),
}

impl From<TreeError> for ProofError {
    fn from(err: TreeError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A Merkle branch for a single leaf, addressed by gindex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleProof {
    pub leaf: [u8; 32],
    pub branch: Vec<[u8; 32]>,
    pub gindex: u64,
}

/// Recompute the root from a single-leaf branch and compare.
///
/// Consumes exactly `floor(log2(gindex))` witnesses bottom-up, choosing
/// concatenation order from the gindex bit parity, and requires the walk
/// to terminate at gindex 1 with the expected root.
pub fn verify_single_proof(root: &[u8; 32], proof: &SingleProof) -> Result<(), ProofError> {
    if proof.gindex == 0 {
        return Err(ProofError::Internal("gindex 0 addresses no node".into()));
    }
    let depth = gindex_depth(proof.gindex);
    if proof.branch.len() != depth as usize {
        return Err(ProofError::Internal(format!(
            "branch length {} does not match gindex depth {depth}",
            proof.branch.len()
        )));
    }

    let mut acc = proof.leaf;
    let mut g = proof.gindex;
    for witness in &proof.branch {
        acc = if g & 1 == 0 {
            hash_pair(&acc, witness)
        } else {
            hash_pair(witness, &acc)
        };
        g >>= 1;
    }

    if g != 1 {
        return Err(ProofError::Internal(format!(
            "proof walk ended at gindex {g}, expected 1"
        )));
    }
    if acc != *root {
        return Err(ProofError::Internal(format!(
            "recomputed root 0x{} does not match 0x{}",
            hex::encode(acc),
            hex::encode(root)
        )));
    }
    Ok(())
}

/// Builds `validators[i]` proofs against one beacon state.
///
/// Construction precomputes the state's field roots and every validator's
/// container root; individual proofs then only hash sibling subtrees.
pub struct ValidatorProofBuilder {
    schema: StateSchema,
    field_roots: Vec<[u8; 32]>,
    validator_roots: Vec<[u8; 32]>,
    state_root: [u8; 32],
}

impl ValidatorProofBuilder {
    /// Build from a deserialized state view (mainnet schema).
    pub fn for_state(view: &BeaconStateView) -> Result<Self, ProofError> {
        let validator_roots = view
            .validators()
            .iter()
            .map(|v| {
                let node = v.clone().hash_tree_root()?;
                Ok(node.as_ref().try_into().expect("node is 32 bytes"))
            })
            .collect::<Result<Vec<[u8; 32]>, MerkleizationError>>()?;
        Self::from_parts(
            StateSchema::for_fork(view.fork()),
            view.field_roots()?,
            validator_roots,
        )
    }

    /// Build from precomputed chunks; `schema` fixes the tree geometry.
    /// Test states pass reduced depths here.
    pub fn from_parts(
        schema: StateSchema,
        field_roots: Vec<[u8; 32]>,
        validator_roots: Vec<[u8; 32]>,
    ) -> Result<Self, ProofError> {
        let expected = 1usize << schema.field_depth;
        if field_roots.len() > expected {
            return Err(ProofError::Internal(format!(
                "{} field roots exceed container depth {}",
                field_roots.len(),
                schema.field_depth
            )));
        }
        let (_, state_root) = prove_chunks(&field_roots, 0, schema.field_depth);
        Ok(Self {
            schema,
            field_roots,
            validator_roots,
            state_root,
        })
    }

    /// Root of the state container these proofs verify against.
    #[must_use]
    pub fn state_root(&self) -> [u8; 32] {
        self.state_root
    }

    /// Prove `validators[index]`; the leaf is the validator container root.
    pub fn prove_validator(&self, index: u64) -> Result<SingleProof, ProofError> {
        let count = self.validator_roots.len();
        if index as usize >= count {
            return Err(ProofError::ValidatorOutOfBounds(index, count));
        }

        let (mut branch, _) = prove_list_element(
            &self.validator_roots,
            index as usize,
            self.schema.validators_depth,
            count,
        );
        let (field_branch, _) = prove_chunks(
            &self.field_roots,
            self.schema.validators_field as usize,
            self.schema.field_depth,
        );
        branch.extend_from_slice(&field_branch);

        let proof = SingleProof {
            leaf: self.validator_roots[index as usize],
            branch,
            gindex: self.schema.validator_gindex(index),
        };
        verify_single_proof(&self.state_root, &proof)?;
        Ok(proof)
    }
}

/// Builds historical block-root proofs against the finalized state.
pub struct HistoricalProofBuilder {
    schema: StateSchema,
    field_roots: Vec<[u8; 32]>,
    summary_roots: Vec<[u8; 32]>,
    block_summary_roots: Vec<[u8; 32]>,
    state_summary_roots: Vec<[u8; 32]>,
    state_root: [u8; 32],
}

impl HistoricalProofBuilder {
    /// Build from the finalized state view (mainnet schema).
    pub fn for_state(view: &BeaconStateView) -> Result<Self, ProofError> {
        let summaries = view.historical_summaries();
        let summary_roots = summaries
            .iter()
            .map(|s| {
                let node = s.clone().hash_tree_root()?;
                Ok(node.as_ref().try_into().expect("node is 32 bytes"))
            })
            .collect::<Result<Vec<[u8; 32]>, MerkleizationError>>()?;
        Self::from_parts(
            StateSchema::for_fork(view.fork()),
            view.field_roots()?,
            summary_roots,
            summaries.iter().map(|s| s.block_summary_root).collect(),
            summaries.iter().map(|s| s.state_summary_root).collect(),
        )
    }

    /// Build from precomputed chunks; `schema` fixes the tree geometry.
    pub fn from_parts(
        schema: StateSchema,
        field_roots: Vec<[u8; 32]>,
        summary_roots: Vec<[u8; 32]>,
        block_summary_roots: Vec<[u8; 32]>,
        state_summary_roots: Vec<[u8; 32]>,
    ) -> Result<Self, ProofError> {
        if summary_roots.len() != block_summary_roots.len()
            || summary_roots.len() != state_summary_roots.len()
        {
            return Err(ProofError::Internal(
                "summary root columns disagree on length".into(),
            ));
        }
        let (_, state_root) = prove_chunks(&field_roots, 0, schema.field_depth);
        Ok(Self {
            schema,
            field_roots,
            summary_roots,
            block_summary_roots,
            state_summary_roots,
            state_root,
        })
    }

    /// Root of the finalized state these proofs verify against.
    #[must_use]
    pub fn state_root(&self) -> [u8; 32] {
        self.state_root
    }

    /// Prove that `summary_block_roots[root_index]` sits below
    /// `historical_summaries[summary_index].block_summary_root`.
    ///
    /// `summary_block_roots` is the `block_roots` vector of the state at
    /// `slot_of_summary(summary_index)`; its tree root must reproduce the
    /// summary's recorded `block_summary_root`, otherwise the two states
    /// disagree and the proof is refused.
    pub fn prove_block_root(
        &self,
        summary_index: u64,
        root_index: u64,
        summary_block_roots: &[[u8; 32]],
    ) -> Result<SingleProof, ProofError> {
        let count = self.summary_roots.len();
        if summary_index as usize >= count {
            return Err(ProofError::SummaryOutOfBounds(summary_index, count));
        }
        if root_index as usize >= summary_block_roots.len() {
            return Err(ProofError::RootOutOfBounds(
                root_index,
                summary_block_roots.len(),
            ));
        }

        // Patch a working copy of the summary container: the recorded
        // block_summary_root leaf becomes the materialized subtree.
        let recorded = self.block_summary_roots[summary_index as usize];
        let roots_subtree = Tree::from_chunks(summary_block_roots, self.schema.block_roots_depth);
        if roots_subtree.root() != recorded {
            return Err(ProofError::Internal(format!(
                "summary-span block roots hash to 0x{}, state records 0x{}",
                hex::encode(roots_subtree.root()),
                hex::encode(recorded)
            )));
        }

        let mut patched = Tree::from_chunks(
            &[recorded, self.state_summary_roots[summary_index as usize]],
            1,
        );
        patched.set_node(2, roots_subtree)?;

        let within_summary =
            concat_gindices(&[2, (1u64 << self.schema.block_roots_depth) + root_index]);
        let mut branch = patched.single_proof(within_summary)?;

        // Summary element within the list, then length mix-in, then the
        // state container level.
        let (list_branch, _) = prove_list_element(
            &self.summary_roots,
            summary_index as usize,
            self.schema.summaries_depth,
            count,
        );
        branch.extend_from_slice(&list_branch);
        let (field_branch, _) = prove_chunks(
            &self.field_roots,
            self.schema.summaries_field as usize,
            self.schema.field_depth,
        );
        branch.extend_from_slice(&field_branch);

        let proof = SingleProof {
            leaf: summary_block_roots[root_index as usize],
            branch,
            gindex: self
                .schema
                .historical_block_root_gindex(summary_index, root_index),
        };
        verify_single_proof(&self.state_root, &proof)?;
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_state::{HistoricalSummary, Validator};
    use crate::sparse_proof::mix_in_length;

    // Reduced-depth schema used by all tests below: an Electra-shaped
    // container (depth 6) over small lists.
    fn test_schema() -> StateSchema {
        StateSchema {
            field_depth: 6,
            validators_field: 11,
            summaries_field: 27,
            validators_depth: 6,
            summaries_depth: 4,
            block_roots_depth: 3,
        }
    }

    fn make_validator(seed: u8) -> Validator {
        let mut v = Validator::default();
        v.pubkey = Vector::try_from(vec![seed; 48]).unwrap();
        v.withdrawal_credentials[0] = 0x01;
        v.withdrawal_credentials[31] = seed;
        v.effective_balance = 32_000_000_000;
        v.activation_epoch = 100 + seed as u64;
        v.exit_epoch = u64::MAX;
        v.withdrawable_epoch = u64::MAX;
        v
    }

    fn field_roots_with(
        schema: &StateSchema,
        validators_root: [u8; 32],
        summaries_root: [u8; 32],
    ) -> Vec<[u8; 32]> {
        let mut roots: Vec<[u8; 32]> = (0..37u8).map(|i| [i.wrapping_add(1); 32]).collect();
        roots[schema.validators_field as usize] = validators_root;
        roots[schema.summaries_field as usize] = summaries_root;
        roots
    }

    fn validator_roots(validators: &[Validator]) -> Vec<[u8; 32]> {
        validators
            .iter()
            .map(|v| v.clone().hash_tree_root().unwrap().into())
            .collect()
    }

    #[test]
    fn verify_rejects_wrong_witness_count() {
        let proof = SingleProof {
            leaf: [1u8; 32],
            branch: vec![[0u8; 32]; 3],
            gindex: 4, // depth 2, but 3 witnesses supplied
        };
        assert!(matches!(
            verify_single_proof(&[0u8; 32], &proof),
            Err(ProofError::Internal(_))
        ));
    }

    #[test]
    fn verify_accepts_manual_proof() {
        let leaf = [1u8; 32];
        let sibling = [2u8; 32];
        let root = hash_pair(&leaf, &sibling);
        let proof = SingleProof {
            leaf,
            branch: vec![sibling],
            gindex: 2,
        };
        verify_single_proof(&root, &proof).expect("valid proof");

        // Flipping the parity must fail.
        let flipped = SingleProof {
            leaf,
            branch: vec![sibling],
            gindex: 3,
        };
        assert!(verify_single_proof(&root, &flipped).is_err());
    }

    #[test]
    fn validator_proof_roundtrips() {
        let schema = test_schema();
        let validators: Vec<Validator> = (0..5).map(make_validator).collect();
        let v_roots = validator_roots(&validators);

        let (_, data_root) = prove_chunks(&v_roots, 0, schema.validators_depth);
        let list_root = mix_in_length(data_root, v_roots.len());
        let field_roots = field_roots_with(&schema, list_root, [0u8; 32]);

        let builder =
            ValidatorProofBuilder::from_parts(schema, field_roots, v_roots.clone()).unwrap();

        for index in 0..5u64 {
            let proof = builder.prove_validator(index).expect("proof");
            assert_eq!(proof.leaf, v_roots[index as usize]);
            // 6 (registry) + 1 (length) + 6 (state) witnesses
            assert_eq!(proof.branch.len(), 13);
            assert_eq!(gindex_depth(proof.gindex), 13);
            verify_single_proof(&builder.state_root(), &proof).expect("re-verify");
        }
    }

    #[test]
    fn validator_proof_out_of_bounds() {
        let schema = test_schema();
        let validators: Vec<Validator> = (0..2).map(make_validator).collect();
        let v_roots = validator_roots(&validators);
        let (_, data_root) = prove_chunks(&v_roots, 0, schema.validators_depth);
        let field_roots =
            field_roots_with(&schema, mix_in_length(data_root, 2), [0u8; 32]);

        let builder = ValidatorProofBuilder::from_parts(schema, field_roots, v_roots).unwrap();
        assert!(matches!(
            builder.prove_validator(2),
            Err(ProofError::ValidatorOutOfBounds(2, 2))
        ));
    }

    #[test]
    fn validator_proof_cross_checked_with_ssz_rs() {
        let schema = test_schema();
        let validators: Vec<Validator> = (0..4).map(make_validator).collect();
        let v_roots = validator_roots(&validators);
        let (_, data_root) = prove_chunks(&v_roots, 0, schema.validators_depth);
        let list_root = mix_in_length(data_root, v_roots.len());
        let field_roots = field_roots_with(&schema, list_root, [0u8; 32]);

        let builder = ValidatorProofBuilder::from_parts(schema, field_roots, v_roots).unwrap();
        let proof = builder.prove_validator(2).expect("proof");

        let root_node = Node::try_from(builder.state_root().as_slice()).unwrap();
        let leaf_node = Node::try_from(proof.leaf.as_slice()).unwrap();
        let branch: Vec<Node> = proof
            .branch
            .iter()
            .map(|w| Node::try_from(w.as_slice()).unwrap())
            .collect();

        ssz_rs::proofs::is_valid_merkle_branch_for_generalized_index(
            leaf_node,
            &branch,
            proof.gindex as usize,
            root_node,
        )
        .expect("ssz_rs agrees");
    }

    fn summaries_fixture(
        schema: &StateSchema,
        spans: &[Vec<[u8; 32]>],
    ) -> (HistoricalProofBuilder, Vec<HistoricalSummary>) {
        let summaries: Vec<HistoricalSummary> = spans
            .iter()
            .enumerate()
            .map(|(i, span)| HistoricalSummary {
                block_summary_root: Tree::from_chunks(span, schema.block_roots_depth).root(),
                state_summary_root: [i as u8 + 0x40; 32],
            })
            .collect();
        let summary_roots: Vec<[u8; 32]> = summaries
            .iter()
            .map(|s| s.clone().hash_tree_root().unwrap().into())
            .collect();
        let (_, data_root) = prove_chunks(&summary_roots, 0, schema.summaries_depth);
        let list_root = mix_in_length(data_root, summary_roots.len());
        let field_roots = field_roots_with(schema, [3u8; 32], list_root);

        let builder = HistoricalProofBuilder::from_parts(
            *schema,
            field_roots,
            summary_roots,
            summaries.iter().map(|s| s.block_summary_root).collect(),
            summaries.iter().map(|s| s.state_summary_root).collect(),
        )
        .unwrap();
        (builder, summaries)
    }

    #[test]
    fn historical_proof_roundtrips() {
        let schema = test_schema();
        let span0: Vec<[u8; 32]> = (0..8u8).map(|i| [i + 1; 32]).collect();
        let span1: Vec<[u8; 32]> = (0..8u8).map(|i| [i + 0x11; 32]).collect();
        let (builder, _) = summaries_fixture(&schema, &[span0.clone(), span1.clone()]);

        let proof = builder.prove_block_root(1, 5, &span1).expect("proof");
        assert_eq!(proof.leaf, span1[5]);
        // 1 (container) + 3 (roots) + 4 (summaries) + 1 (length) + 6 (state)
        assert_eq!(proof.branch.len(), 15);
        verify_single_proof(&builder.state_root(), &proof).expect("re-verify");

        // Another span, another index.
        let proof0 = builder.prove_block_root(0, 0, &span0).expect("proof");
        verify_single_proof(&builder.state_root(), &proof0).expect("re-verify");
    }

    #[test]
    fn historical_proof_cross_checked_with_ssz_rs() {
        let schema = test_schema();
        let span: Vec<[u8; 32]> = (0..8u8).map(|i| [i + 7; 32]).collect();
        let (builder, _) = summaries_fixture(&schema, &[span.clone()]);

        let proof = builder.prove_block_root(0, 3, &span).expect("proof");

        let root_node = Node::try_from(builder.state_root().as_slice()).unwrap();
        let leaf_node = Node::try_from(proof.leaf.as_slice()).unwrap();
        let branch: Vec<Node> = proof
            .branch
            .iter()
            .map(|w| Node::try_from(w.as_slice()).unwrap())
            .collect();

        ssz_rs::proofs::is_valid_merkle_branch_for_generalized_index(
            leaf_node,
            &branch,
            proof.gindex as usize,
            root_node,
        )
        .expect("ssz_rs agrees");
    }

    #[test]
    fn historical_proof_rejects_mismatched_span() {
        let schema = test_schema();
        let span: Vec<[u8; 32]> = (0..8u8).map(|i| [i + 1; 32]).collect();
        let (builder, _) = summaries_fixture(&schema, &[span]);

        // A span that does not hash to the recorded block_summary_root.
        let wrong: Vec<[u8; 32]> = (0..8u8).map(|i| [i + 9; 32]).collect();
        assert!(matches!(
            builder.prove_block_root(0, 0, &wrong),
            Err(ProofError::Internal(_))
        ));
    }
}
