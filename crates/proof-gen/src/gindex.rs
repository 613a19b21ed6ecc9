//! Generalized Index Arithmetic
//!
//! Gindices number the nodes of a complete binary Merkle tree: the root is
//! 1, children of `i` are `2i` and `2i+1`. A proof for the node at gindex
//! `g` carries exactly `floor(log2(g))` sibling witnesses.

use crate::beacon_state::{limits, ForkName};

/// Concatenate gindices along a path of nested subtrees.
///
/// Each element is a gindex relative to the subtree selected by the
/// previous one; the result is absolute from the outermost root.
#[must_use]
pub fn concat_gindices(gindices: &[u64]) -> u64 {
    let mut acc = 1u64;
    for &g in gindices {
        let depth = gindex_depth(g);
        acc = (acc << depth) | (g ^ (1u64 << depth));
    }
    acc
}

/// Number of proof witnesses for a node at this gindex.
#[must_use]
pub const fn gindex_depth(gindex: u64) -> u32 {
    63 - gindex.leading_zeros()
}

/// Per-fork geometry of the beacon-state container tree.
///
/// `validators` is field 11 and `historical_summaries` field 27 in every
/// supported fork; what changes is the container depth (28 fields fit in
/// depth 5, 37+ need depth 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSchema {
    /// Depth of the state container tree (log2 of the field-slot count).
    pub field_depth: u32,
    /// Field index of `validators`.
    pub validators_field: u64,
    /// Field index of `historical_summaries`.
    pub summaries_field: u64,
    /// Depth of the validators list data tree.
    pub validators_depth: u32,
    /// Depth of the historical-summaries list data tree.
    pub summaries_depth: u32,
    /// Depth of the `block_roots` vector inside a summary span.
    pub block_roots_depth: u32,
}

const VALIDATORS_FIELD_INDEX: u64 = 11;
const HISTORICAL_SUMMARIES_FIELD_INDEX: u64 = 27;

impl StateSchema {
    /// Mainnet schema for the given fork.
    #[must_use]
    pub const fn for_fork(fork: ForkName) -> Self {
        let field_depth = match fork {
            ForkName::Capella | ForkName::Deneb => 5,
            ForkName::Electra | ForkName::Fulu => 6,
        };
        Self {
            field_depth,
            validators_field: VALIDATORS_FIELD_INDEX,
            summaries_field: HISTORICAL_SUMMARIES_FIELD_INDEX,
            validators_depth: limits::VALIDATORS_TREE_DEPTH,
            summaries_depth: limits::SUMMARIES_TREE_DEPTH,
            block_roots_depth: limits::BLOCK_ROOTS_TREE_DEPTH,
        }
    }

    /// Gindex of the `validators` field within the state container.
    #[must_use]
    pub const fn validators_field_gindex(&self) -> u64 {
        (1u64 << self.field_depth) + self.validators_field
    }

    /// Gindex of the `historical_summaries` field within the state container.
    #[must_use]
    pub const fn summaries_field_gindex(&self) -> u64 {
        (1u64 << self.field_depth) + self.summaries_field
    }

    /// Absolute gindex of `validators[index]` from the state root.
    ///
    /// Path: state -> validators list -> data root -> element.
    #[must_use]
    pub fn validator_gindex(&self, index: u64) -> u64 {
        concat_gindices(&[
            self.validators_field_gindex(),
            2,
            (1u64 << self.validators_depth) + index,
        ])
    }

    /// Absolute gindex of
    /// `historical_summaries[summary_index].block_summary_root[root_index]`
    /// from the state root, descending through the patched block-roots
    /// subtree.
    #[must_use]
    pub fn historical_block_root_gindex(&self, summary_index: u64, root_index: u64) -> u64 {
        concat_gindices(&[
            self.summaries_field_gindex(),
            2,
            (1u64 << self.summaries_depth) + summary_index,
            2, // block_summary_root within HistoricalSummary
            (1u64 << self.block_roots_depth) + root_index,
        ])
    }

    /// Expected witness count for a validator proof.
    #[must_use]
    pub fn validator_proof_len(&self) -> u32 {
        gindex_depth(self.validator_gindex(0))
    }

    /// Expected witness count for a historical block-root proof.
    #[must_use]
    pub fn historical_proof_len(&self) -> u32 {
        gindex_depth(self.historical_block_root_gindex(0, 0))
    }
}

/// Index of the historical summary covering `slot`.
#[must_use]
pub fn summary_index(slot: u64, capella_fork_slot: u64, slots_per_historical_root: u64) -> u64 {
    (slot - capella_fork_slot) / slots_per_historical_root
}

/// Slot of the state whose `block_roots` vector materializes summary `index`.
#[must_use]
pub fn slot_of_summary(index: u64, capella_fork_slot: u64, slots_per_historical_root: u64) -> u64 {
    capella_fork_slot + (index + 1) * slots_per_historical_root
}

/// Position of `slot`'s block root within its summary span.
#[must_use]
pub fn root_index_in_summary(slot: u64, slots_per_historical_root: u64) -> u64 {
    slot % slots_per_historical_root
}

/// Whether a deadline slot has aged out of the finalized state's own
/// `block_roots` window and must be proven through a historical summary.
#[must_use]
pub fn is_slot_old(deadline_slot: u64, head_slot: u64, slots_per_historical_root: u64) -> bool {
    head_slot.saturating_sub(deadline_slot) >= slots_per_historical_root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_single_gindex_is_identity() {
        assert_eq!(concat_gindices(&[11]), 11);
        assert_eq!(concat_gindices(&[2]), 2);
        assert_eq!(concat_gindices(&[3]), 3);
    }

    #[test]
    fn concat_composes_depths() {
        assert_eq!(concat_gindices(&[2, 2]), 4);
        assert_eq!(concat_gindices(&[2, 3]), 5);
        assert_eq!(concat_gindices(&[3, 2]), 6);
        assert_eq!(concat_gindices(&[3, 3]), 7);
        // depth adds up: 1 + 1 + 1 = 3
        assert_eq!(gindex_depth(concat_gindices(&[2, 2, 2])), 3);
    }

    #[test]
    fn depth_of_gindex() {
        assert_eq!(gindex_depth(1), 0);
        assert_eq!(gindex_depth(2), 1);
        assert_eq!(gindex_depth(3), 1);
        assert_eq!(gindex_depth(4), 2);
        assert_eq!(gindex_depth(7), 2);
        assert_eq!(gindex_depth(8), 3);
    }

    #[test]
    fn schema_field_gindices() {
        let capella = StateSchema::for_fork(ForkName::Capella);
        assert_eq!(capella.validators_field_gindex(), 43);
        assert_eq!(capella.summaries_field_gindex(), 59);

        let electra = StateSchema::for_fork(ForkName::Electra);
        assert_eq!(electra.validators_field_gindex(), 75);
        assert_eq!(electra.summaries_field_gindex(), 91);
    }

    #[test]
    fn validator_proof_lengths() {
        // Capella: 5 (state) + 1 (list) + 40 (registry) = 46
        assert_eq!(
            StateSchema::for_fork(ForkName::Capella).validator_proof_len(),
            46
        );
        // Electra: 6 (state) + 1 (list) + 40 (registry) = 47
        assert_eq!(
            StateSchema::for_fork(ForkName::Electra).validator_proof_len(),
            47
        );
    }

    #[test]
    fn historical_proof_lengths() {
        // Electra: 6 + 1 + 24 (summaries) + 1 (container) + 13 (roots) = 45
        assert_eq!(
            StateSchema::for_fork(ForkName::Electra).historical_proof_len(),
            45
        );
        assert_eq!(
            StateSchema::for_fork(ForkName::Deneb).historical_proof_len(),
            44
        );
    }

    #[test]
    fn summary_arithmetic() {
        let capella_slot = 6_209_536;
        let sphr = 8192;

        assert_eq!(summary_index(capella_slot, capella_slot, sphr), 0);
        assert_eq!(summary_index(capella_slot + 8191, capella_slot, sphr), 0);
        assert_eq!(summary_index(capella_slot + 8192, capella_slot, sphr), 1);

        assert_eq!(slot_of_summary(0, capella_slot, sphr), capella_slot + 8192);
        assert_eq!(slot_of_summary(2, capella_slot, sphr), capella_slot + 3 * 8192);

        assert_eq!(root_index_in_summary(8192, sphr), 0);
        assert_eq!(root_index_in_summary(8193, sphr), 1);
    }

    #[test]
    fn slot_age_boundary() {
        let sphr = 8192;
        assert!(!is_slot_old(1000, 1000 + 8191, sphr));
        assert!(is_slot_old(1000, 1000 + 8192, sphr));
        assert!(is_slot_old(1000, 1000 + 20_000, sphr));
        // head behind deadline cannot be old
        assert!(!is_slot_old(1000, 900, sphr));
    }
}
