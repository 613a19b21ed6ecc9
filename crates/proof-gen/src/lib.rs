//! # Proof Generation Library
//!
//! Beacon-state views and Merkle proof construction for validator
//! exit-delay verification:
//! - fork-typed SSZ `BeaconState` decoding (Capella through Fulu),
//! - a failover beacon API client,
//! - `validators[i]` proofs against a state root,
//! - historical block-root proofs through patched summary subtrees.

pub mod beacon_client;
pub mod beacon_state;
pub mod gindex;
pub mod proof;
pub mod sparse_proof;
pub mod tree;

pub use beacon_client::{
    BeaconClient, BeaconClientConfig, BeaconClientError, BeaconHeaderInfo, BlockId, BlockInfo,
    ChainSpecInfo, GenesisInfo,
};
pub use beacon_state::{BeaconBlockHeader, BeaconStateView, ForkName, HistoricalSummary, Validator};
pub use gindex::StateSchema;
pub use proof::{
    verify_single_proof, HistoricalProofBuilder, ProofError, SingleProof, ValidatorProofBuilder,
};
pub use tree::Tree;
