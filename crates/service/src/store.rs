//! Validator Store
//!
//! In-memory bookkeeping of validators awaiting proof, keyed by exit
//! deadline slot, together with the set of pubkeys whose proofs have been
//! confirmed on-chain. Both survive only for the process lifetime; on
//! restart they are rebuilt from the event lookback window, and the
//! on-chain penalty-applicability re-check keeps that idempotent.

use alloy::primitives::B256;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// BLS public key of a validator.
pub type ValidatorPubkey = [u8; 48];

/// One oracle exit request, shared by every deadline group it spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRequestData {
    pub exit_requests_hash: B256,
    pub data: Vec<u8>,
    pub data_format: u64,
    pub delivered_at: u64,
}

/// A validator tracked until it is proven and no longer penalizable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedValidator {
    pub exit_data_index: u32,
    pub module_id: u64,
    pub node_op_id: u64,
    pub validator_index: u64,
    pub pubkey: ValidatorPubkey,
    pub activation_epoch: u64,
    pub eligible_exit_at: u64,
    pub exit_deadline_epoch: u64,
}

/// Validators from one exit request sharing one deadline slot.
#[derive(Debug, Clone)]
pub struct DeadlineGroup {
    pub request: Arc<ExitRequestData>,
    pub validators: Vec<TrackedValidator>,
}

/// Counters exported to the observability endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub slots: usize,
    pub min_slot: Option<u64>,
    pub max_slot: Option<u64>,
    pub validators: usize,
}

/// Pubkeys whose proof transaction has been confirmed and whose on-chain
/// penalty predicate has not since returned false.
#[derive(Debug, Default)]
pub struct ReportedSet {
    pubkeys: HashSet<ValidatorPubkey>,
}

impl ReportedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pubkey: ValidatorPubkey) -> bool {
        self.pubkeys.insert(pubkey)
    }

    pub fn remove(&mut self, pubkey: &ValidatorPubkey) -> bool {
        self.pubkeys.remove(pubkey)
    }

    #[must_use]
    pub fn contains(&self, pubkey: &ValidatorPubkey) -> bool {
        self.pubkeys.contains(pubkey)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pubkeys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pubkeys.is_empty()
    }
}

/// Ordered map `deadline slot -> deadline groups`.
#[derive(Debug, Default)]
pub struct ValidatorStore {
    slots: BTreeMap<u64, Vec<DeadlineGroup>>,
}

impl ValidatorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append validators under a deadline slot. Entries merge into an
    /// existing group of the same exit request; validators already tracked
    /// there (by pubkey) are dropped, which keeps failure-retried
    /// accumulation passes from double-counting.
    pub fn add(&mut self, deadline_slot: u64, group: DeadlineGroup) {
        let groups = self.slots.entry(deadline_slot).or_default();
        if let Some(existing) = groups
            .iter_mut()
            .find(|g| g.request.exit_requests_hash == group.request.exit_requests_hash)
        {
            for validator in group.validators {
                if !existing.validators.iter().any(|v| v.pubkey == validator.pubkey) {
                    existing.validators.push(validator);
                }
            }
        } else if !group.validators.is_empty() {
            groups.push(group);
        }
    }

    /// Deadline slots at or before `head_slot`, ascending.
    #[must_use]
    pub fn eligible_slots(&self, head_slot: u64) -> Vec<u64> {
        self.slots.range(..=head_slot).map(|(slot, _)| *slot).collect()
    }

    #[must_use]
    pub fn groups(&self, deadline_slot: u64) -> Option<&[DeadlineGroup]> {
        self.slots.get(&deadline_slot).map(Vec::as_slice)
    }

    /// Drop eligible validators that are *not* in the reported set: they
    /// were reported and are no longer penalty-applicable, so nothing is
    /// left to re-check. Validators still in the set stay for the next
    /// pass. Empty groups and slots are removed.
    pub fn cleanup(&mut self, head_slot: u64, reported: &ReportedSet) {
        let eligible: Vec<u64> = self.eligible_slots(head_slot);
        for slot in eligible {
            let emptied = match self.slots.get_mut(&slot) {
                Some(groups) => {
                    for group in groups.iter_mut() {
                        group.validators.retain(|v| reported.contains(&v.pubkey));
                    }
                    groups.retain(|g| !g.validators.is_empty());
                    groups.is_empty()
                }
                None => false,
            };
            if emptied {
                self.slots.remove(&slot);
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            slots: self.slots.len(),
            min_slot: self.slots.keys().next().copied(),
            max_slot: self.slots.keys().next_back().copied(),
            validators: self
                .slots
                .values()
                .flat_map(|groups| groups.iter())
                .map(|g| g.validators.len())
                .sum(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
