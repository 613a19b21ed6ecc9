//! Beacon State SSZ Types
//!
//! Fork-typed `BeaconState` definitions (Capella through Fulu, mainnet
//! limits) plus the shared containers they are built from. The full field
//! lists are required because proofs descend from the state root: every
//! sibling field root participates in the Merkle branch.

use ssz_rs::prelude::*;

/// Consensus-layer fork names this crate can deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkName {
    Capella,
    Deneb,
    Electra,
    Fulu,
}

impl ForkName {
    /// Parse the value of the `Eth-Consensus-Version` response header.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "capella" => Some(Self::Capella),
            "deneb" => Some(Self::Deneb),
            "electra" => Some(Self::Electra),
            "fulu" => Some(Self::Fulu),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Capella => "capella",
            Self::Deneb => "deneb",
            Self::Electra => "electra",
            Self::Fulu => "fulu",
        }
    }
}

impl std::fmt::Display for ForkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mainnet preset limits that shape the proof geometry.
pub mod limits {
    /// `SLOTS_PER_HISTORICAL_ROOT`
    pub const SLOTS_PER_HISTORICAL_ROOT: usize = 8192;
    /// `HISTORICAL_ROOTS_LIMIT` (2^24), shared by `historical_summaries`
    pub const HISTORICAL_ROOTS_LIMIT: usize = 16_777_216;
    /// `VALIDATOR_REGISTRY_LIMIT` (2^40)
    pub const VALIDATOR_REGISTRY_LIMIT: usize = 1_099_511_627_776;
    /// `EPOCHS_PER_HISTORICAL_VECTOR`
    pub const EPOCHS_PER_HISTORICAL_VECTOR: usize = 65_536;
    /// `EPOCHS_PER_SLASHINGS_VECTOR`
    pub const EPOCHS_PER_SLASHINGS_VECTOR: usize = 8192;
    /// `EPOCHS_PER_ETH1_VOTING_PERIOD * SLOTS_PER_EPOCH`
    pub const ETH1_DATA_VOTES_LIMIT: usize = 2048;
    /// `SYNC_COMMITTEE_SIZE`
    pub const SYNC_COMMITTEE_SIZE: usize = 512;
    /// `PENDING_DEPOSITS_LIMIT` (2^27)
    pub const PENDING_DEPOSITS_LIMIT: usize = 134_217_728;
    /// `PENDING_PARTIAL_WITHDRAWALS_LIMIT` (2^27)
    pub const PENDING_PARTIAL_WITHDRAWALS_LIMIT: usize = 134_217_728;
    /// `PENDING_CONSOLIDATIONS_LIMIT` (2^18)
    pub const PENDING_CONSOLIDATIONS_LIMIT: usize = 262_144;
    /// `(MIN_SEED_LOOKAHEAD + 1) * SLOTS_PER_EPOCH`
    pub const PROPOSER_LOOKAHEAD_LIMIT: usize = 64;

    /// Tree depth of the validators list data tree: log2(2^40)
    pub const VALIDATORS_TREE_DEPTH: u32 = 40;
    /// Tree depth of the historical summaries list data tree: log2(2^24)
    pub const SUMMARIES_TREE_DEPTH: u32 = 24;
    /// Tree depth of the block-roots vector: log2(8192)
    pub const BLOCK_ROOTS_TREE_DEPTH: u32 = 13;
}

/// Fork data
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Fork {
    pub previous_version: [u8; 4],
    pub current_version: [u8; 4],
    pub epoch: u64,
}

/// Checkpoint for finality tracking
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: [u8; 32],
}

/// Eth1 deposit data
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Eth1Data {
    pub deposit_root: [u8; 32],
    pub deposit_count: u64,
    pub block_hash: [u8; 32],
}

/// Beacon block header
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: [u8; 32],
    pub state_root: [u8; 32],
    pub body_root: [u8; 32],
}

/// Validator registry record
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct Validator {
    pub pubkey: Vector<u8, 48>,
    pub withdrawal_credentials: [u8; 32],
    pub effective_balance: u64,
    pub slashed: bool,
    pub activation_eligibility_epoch: u64,
    pub activation_epoch: u64,
    pub exit_epoch: u64,
    pub withdrawable_epoch: u64,
}

/// Historical summary, one per completed span of `SLOTS_PER_HISTORICAL_ROOT`
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct HistoricalSummary {
    pub block_summary_root: [u8; 32],
    pub state_summary_root: [u8; 32],
}

/// Sync committee (Altair+)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct SyncCommittee {
    pub pubkeys: Vector<Vector<u8, 48>, { limits::SYNC_COMMITTEE_SIZE }>,
    pub aggregate_pubkey: Vector<u8, 48>,
}

/// Execution payload header as of Capella
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct ExecutionPayloadHeaderCapella {
    pub parent_hash: [u8; 32],
    pub fee_recipient: [u8; 20],
    pub state_root: [u8; 32],
    pub receipts_root: [u8; 32],
    pub logs_bloom: Vector<u8, 256>,
    pub prev_randao: [u8; 32],
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: List<u8, 32>,
    pub base_fee_per_gas: U256,
    pub block_hash: [u8; 32],
    pub transactions_root: [u8; 32],
    pub withdrawals_root: [u8; 32],
}

/// Execution payload header as of Deneb (adds blob gas accounting)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct ExecutionPayloadHeaderDeneb {
    pub parent_hash: [u8; 32],
    pub fee_recipient: [u8; 20],
    pub state_root: [u8; 32],
    pub receipts_root: [u8; 32],
    pub logs_bloom: Vector<u8, 256>,
    pub prev_randao: [u8; 32],
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: List<u8, 32>,
    pub base_fee_per_gas: U256,
    pub block_hash: [u8; 32],
    pub transactions_root: [u8; 32],
    pub withdrawals_root: [u8; 32],
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

/// Pending deposit entry (Electra+)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct PendingDeposit {
    pub pubkey: Vector<u8, 48>,
    pub withdrawal_credentials: [u8; 32],
    pub amount: u64,
    pub signature: Vector<u8, 96>,
    pub slot: u64,
}

/// Pending partial withdrawal (Electra+)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct PendingPartialWithdrawal {
    pub validator_index: u64,
    pub amount: u64,
    pub withdrawable_epoch: u64,
}

/// Pending consolidation (Electra+)
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct PendingConsolidation {
    pub source_index: u64,
    pub target_index: u64,
}

/// Capella BeaconState: 28 fields, container depth 5.
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct BeaconStateCapella {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub state_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub historical_roots: List<[u8; 32], { limits::HISTORICAL_ROOTS_LIMIT }>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, { limits::ETH1_DATA_VOTES_LIMIT }>,
    pub eth1_deposit_index: u64,
    pub validators: List<Validator, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub balances: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub randao_mixes: Vector<[u8; 32], { limits::EPOCHS_PER_HISTORICAL_VECTOR }>,
    pub slashings: Vector<u64, { limits::EPOCHS_PER_SLASHINGS_VECTOR }>,
    pub previous_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeaderCapella,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, { limits::HISTORICAL_ROOTS_LIMIT }>,
}

/// Deneb BeaconState: same 28 fields, Deneb payload header.
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct BeaconStateDeneb {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub state_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub historical_roots: List<[u8; 32], { limits::HISTORICAL_ROOTS_LIMIT }>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, { limits::ETH1_DATA_VOTES_LIMIT }>,
    pub eth1_deposit_index: u64,
    pub validators: List<Validator, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub balances: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub randao_mixes: Vector<[u8; 32], { limits::EPOCHS_PER_HISTORICAL_VECTOR }>,
    pub slashings: Vector<u64, { limits::EPOCHS_PER_SLASHINGS_VECTOR }>,
    pub previous_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeaderDeneb,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, { limits::HISTORICAL_ROOTS_LIMIT }>,
}

/// Electra BeaconState: 37 fields, container depth 6.
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct BeaconStateElectra {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub state_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub historical_roots: List<[u8; 32], { limits::HISTORICAL_ROOTS_LIMIT }>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, { limits::ETH1_DATA_VOTES_LIMIT }>,
    pub eth1_deposit_index: u64,
    pub validators: List<Validator, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub balances: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub randao_mixes: Vector<[u8; 32], { limits::EPOCHS_PER_HISTORICAL_VECTOR }>,
    pub slashings: Vector<u64, { limits::EPOCHS_PER_SLASHINGS_VECTOR }>,
    pub previous_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeaderDeneb,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, { limits::HISTORICAL_ROOTS_LIMIT }>,
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: u64,
    pub exit_balance_to_consume: u64,
    pub earliest_exit_epoch: u64,
    pub consolidation_balance_to_consume: u64,
    pub earliest_consolidation_epoch: u64,
    pub pending_deposits: List<PendingDeposit, { limits::PENDING_DEPOSITS_LIMIT }>,
    pub pending_partial_withdrawals:
        List<PendingPartialWithdrawal, { limits::PENDING_PARTIAL_WITHDRAWALS_LIMIT }>,
    pub pending_consolidations: List<PendingConsolidation, { limits::PENDING_CONSOLIDATIONS_LIMIT }>,
}

/// Fulu BeaconState: Electra plus `proposer_lookahead`, 38 fields, depth 6.
#[derive(Debug, Clone, Default, PartialEq, Eq, SimpleSerialize)]
pub struct BeaconStateFulu {
    pub genesis_time: u64,
    pub genesis_validators_root: [u8; 32],
    pub slot: u64,
    pub fork: Fork,
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub state_roots: Vector<[u8; 32], { limits::SLOTS_PER_HISTORICAL_ROOT }>,
    pub historical_roots: List<[u8; 32], { limits::HISTORICAL_ROOTS_LIMIT }>,
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: List<Eth1Data, { limits::ETH1_DATA_VOTES_LIMIT }>,
    pub eth1_deposit_index: u64,
    pub validators: List<Validator, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub balances: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub randao_mixes: Vector<[u8; 32], { limits::EPOCHS_PER_HISTORICAL_VECTOR }>,
    pub slashings: Vector<u64, { limits::EPOCHS_PER_SLASHINGS_VECTOR }>,
    pub previous_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_epoch_participation: List<u8, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub justification_bits: Bitvector<4>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
    pub inactivity_scores: List<u64, { limits::VALIDATOR_REGISTRY_LIMIT }>,
    pub current_sync_committee: SyncCommittee,
    pub next_sync_committee: SyncCommittee,
    pub latest_execution_payload_header: ExecutionPayloadHeaderDeneb,
    pub next_withdrawal_index: u64,
    pub next_withdrawal_validator_index: u64,
    pub historical_summaries: List<HistoricalSummary, { limits::HISTORICAL_ROOTS_LIMIT }>,
    pub deposit_requests_start_index: u64,
    pub deposit_balance_to_consume: u64,
    pub exit_balance_to_consume: u64,
    pub earliest_exit_epoch: u64,
    pub consolidation_balance_to_consume: u64,
    pub earliest_consolidation_epoch: u64,
    pub pending_deposits: List<PendingDeposit, { limits::PENDING_DEPOSITS_LIMIT }>,
    pub pending_partial_withdrawals:
        List<PendingPartialWithdrawal, { limits::PENDING_PARTIAL_WITHDRAWALS_LIMIT }>,
    pub pending_consolidations: List<PendingConsolidation, { limits::PENDING_CONSOLIDATIONS_LIMIT }>,
    pub proposer_lookahead: Vector<u64, { limits::PROPOSER_LOOKAHEAD_LIMIT }>,
}

/// A deserialized beacon state, dispatched by fork.
///
/// Boxed: the mainnet states are tens of megabytes of list data.
#[derive(Debug, Clone)]
pub enum BeaconStateView {
    Capella(Box<BeaconStateCapella>),
    Deneb(Box<BeaconStateDeneb>),
    Electra(Box<BeaconStateElectra>),
    Fulu(Box<BeaconStateFulu>),
}

macro_rules! with_state {
    ($view:expr, $state:ident => $body:expr) => {
        match $view {
            BeaconStateView::Capella($state) => $body,
            BeaconStateView::Deneb($state) => $body,
            BeaconStateView::Electra($state) => $body,
            BeaconStateView::Fulu($state) => $body,
        }
    };
}

impl BeaconStateView {
    /// Deserialize SSZ state bytes under the given fork's schema.
    pub fn decode(fork: ForkName, bytes: &[u8]) -> Result<Self, DeserializeError> {
        Ok(match fork {
            ForkName::Capella => Self::Capella(Box::new(ssz_rs::deserialize(bytes)?)),
            ForkName::Deneb => Self::Deneb(Box::new(ssz_rs::deserialize(bytes)?)),
            ForkName::Electra => Self::Electra(Box::new(ssz_rs::deserialize(bytes)?)),
            ForkName::Fulu => Self::Fulu(Box::new(ssz_rs::deserialize(bytes)?)),
        })
    }

    #[must_use]
    pub fn fork(&self) -> ForkName {
        match self {
            Self::Capella(_) => ForkName::Capella,
            Self::Deneb(_) => ForkName::Deneb,
            Self::Electra(_) => ForkName::Electra,
            Self::Fulu(_) => ForkName::Fulu,
        }
    }

    #[must_use]
    pub fn slot(&self) -> u64 {
        with_state!(self, s => s.slot)
    }

    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        with_state!(self, s => &s.validators)
    }

    #[must_use]
    pub fn validator(&self, index: u64) -> Option<&Validator> {
        self.validators().get(index as usize)
    }

    #[must_use]
    pub fn block_roots(&self) -> &[[u8; 32]] {
        with_state!(self, s => &s.block_roots)
    }

    #[must_use]
    pub fn historical_summaries(&self) -> &[HistoricalSummary] {
        with_state!(self, s => &s.historical_summaries)
    }

    /// Hash every top-level field, in declaration order. These are the
    /// chunks of the state container's own Merkle tree.
    pub fn field_roots(&self) -> Result<Vec<[u8; 32]>, MerkleizationError> {
        match self {
            Self::Capella(s) => capella_field_roots(s),
            Self::Deneb(s) => deneb_field_roots(s),
            Self::Electra(s) => electra_field_roots(s),
            Self::Fulu(s) => fulu_field_roots(s),
        }
    }
}

fn root_of<T: Merkleized + Clone>(value: &T) -> Result<[u8; 32], MerkleizationError> {
    let node = value.clone().hash_tree_root()?;
    Ok(node.as_ref().try_into().expect("node is 32 bytes"))
}

// The first 28 fields are identical across Capella..Fulu; Electra adds nine
// more and Fulu one on top. Expanded per fork so the chunk order always
// matches the struct declaration order.
macro_rules! push_shared_field_roots {
    ($roots:ident, $s:expr) => {
        $roots.push(root_of(&$s.genesis_time)?);
        $roots.push(root_of(&$s.genesis_validators_root)?);
        $roots.push(root_of(&$s.slot)?);
        $roots.push(root_of(&$s.fork)?);
        $roots.push(root_of(&$s.latest_block_header)?);
        $roots.push(root_of(&$s.block_roots)?);
        $roots.push(root_of(&$s.state_roots)?);
        $roots.push(root_of(&$s.historical_roots)?);
        $roots.push(root_of(&$s.eth1_data)?);
        $roots.push(root_of(&$s.eth1_data_votes)?);
        $roots.push(root_of(&$s.eth1_deposit_index)?);
        $roots.push(root_of(&$s.validators)?);
        $roots.push(root_of(&$s.balances)?);
        $roots.push(root_of(&$s.randao_mixes)?);
        $roots.push(root_of(&$s.slashings)?);
        $roots.push(root_of(&$s.previous_epoch_participation)?);
        $roots.push(root_of(&$s.current_epoch_participation)?);
        $roots.push(root_of(&$s.justification_bits)?);
        $roots.push(root_of(&$s.previous_justified_checkpoint)?);
        $roots.push(root_of(&$s.current_justified_checkpoint)?);
        $roots.push(root_of(&$s.finalized_checkpoint)?);
        $roots.push(root_of(&$s.inactivity_scores)?);
        $roots.push(root_of(&$s.current_sync_committee)?);
        $roots.push(root_of(&$s.next_sync_committee)?);
        $roots.push(root_of(&$s.latest_execution_payload_header)?);
        $roots.push(root_of(&$s.next_withdrawal_index)?);
        $roots.push(root_of(&$s.next_withdrawal_validator_index)?);
        $roots.push(root_of(&$s.historical_summaries)?);
    };
}

macro_rules! push_electra_field_roots {
    ($roots:ident, $s:expr) => {
        $roots.push(root_of(&$s.deposit_requests_start_index)?);
        $roots.push(root_of(&$s.deposit_balance_to_consume)?);
        $roots.push(root_of(&$s.exit_balance_to_consume)?);
        $roots.push(root_of(&$s.earliest_exit_epoch)?);
        $roots.push(root_of(&$s.consolidation_balance_to_consume)?);
        $roots.push(root_of(&$s.earliest_consolidation_epoch)?);
        $roots.push(root_of(&$s.pending_deposits)?);
        $roots.push(root_of(&$s.pending_partial_withdrawals)?);
        $roots.push(root_of(&$s.pending_consolidations)?);
    };
}

fn capella_field_roots(s: &BeaconStateCapella) -> Result<Vec<[u8; 32]>, MerkleizationError> {
    let mut roots = Vec::with_capacity(28);
    push_shared_field_roots!(roots, s);
    Ok(roots)
}

fn deneb_field_roots(s: &BeaconStateDeneb) -> Result<Vec<[u8; 32]>, MerkleizationError> {
    let mut roots = Vec::with_capacity(28);
    push_shared_field_roots!(roots, s);
    Ok(roots)
}

fn electra_field_roots(s: &BeaconStateElectra) -> Result<Vec<[u8; 32]>, MerkleizationError> {
    let mut roots = Vec::with_capacity(37);
    push_shared_field_roots!(roots, s);
    push_electra_field_roots!(roots, s);
    Ok(roots)
}

fn fulu_field_roots(s: &BeaconStateFulu) -> Result<Vec<[u8; 32]>, MerkleizationError> {
    let mut roots = Vec::with_capacity(38);
    push_shared_field_roots!(roots, s);
    push_electra_field_roots!(roots, s);
    roots.push(root_of(&s.proposer_lookahead)?);
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_name_parsing() {
        assert_eq!(ForkName::parse("capella"), Some(ForkName::Capella));
        assert_eq!(ForkName::parse("ELECTRA"), Some(ForkName::Electra));
        assert_eq!(ForkName::parse(" deneb "), Some(ForkName::Deneb));
        assert_eq!(ForkName::parse("fulu"), Some(ForkName::Fulu));
        assert_eq!(ForkName::parse("bellatrix"), None);
        assert_eq!(ForkName::parse(""), None);
    }

    #[test]
    fn validator_hash_tree_root_nonzero() {
        let mut validator = Validator::default();
        validator.effective_balance = 32_000_000_000;
        validator.activation_epoch = 100;
        validator.withdrawal_credentials[0] = 0x01;

        let root: [u8; 32] = validator.hash_tree_root().expect("should hash").into();
        assert_ne!(root, [0u8; 32]);
    }

    #[test]
    fn validator_ssz_roundtrip() {
        let mut validator = Validator::default();
        validator.pubkey = Vector::try_from(vec![0xaa; 48]).unwrap();
        validator.exit_epoch = u64::MAX;
        validator.withdrawable_epoch = u64::MAX;

        let encoded = ssz_rs::serialize(&validator).expect("serialize");
        let decoded: Validator = ssz_rs::deserialize(&encoded).expect("deserialize");
        assert_eq!(validator, decoded);
    }

    #[test]
    fn header_ssz_roundtrip() {
        let header = BeaconBlockHeader {
            slot: 7_654_321,
            proposer_index: 42,
            parent_root: [1u8; 32],
            state_root: [2u8; 32],
            body_root: [3u8; 32],
        };

        let encoded = ssz_rs::serialize(&header).expect("serialize");
        let decoded: BeaconBlockHeader = ssz_rs::deserialize(&encoded).expect("deserialize");
        assert_eq!(header, decoded);
    }

    #[test]
    fn historical_summary_root_depends_on_both_fields() {
        let mut a = HistoricalSummary {
            block_summary_root: [1u8; 32],
            state_summary_root: [2u8; 32],
        };
        let mut b = HistoricalSummary {
            block_summary_root: [1u8; 32],
            state_summary_root: [3u8; 32],
        };
        let ra: [u8; 32] = a.hash_tree_root().unwrap().into();
        let rb: [u8; 32] = b.hash_tree_root().unwrap().into();
        assert_ne!(ra, rb);
    }
}
