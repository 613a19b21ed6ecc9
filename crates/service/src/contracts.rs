//! Contract Bindings and Typed Clients
//!
//! All addresses are resolved once through the locator at startup; the
//! per-module node-operator registries share one ABI and are dispatched
//! through a `moduleId -> address` table built from the staking router.

use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy::sol_types::{SolCall, SolEvent};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

sol! {
    #[sol(rpc)]
    contract LidoLocator {
        function validatorExitDelayVerifier() external view returns (address);
        function validatorsExitBusOracle() external view returns (address);
        function stakingRouter() external view returns (address);
    }

    #[sol(rpc)]
    contract ValidatorsExitBusOracle {
        struct ReportData {
            uint256 consensusVersion;
            uint256 refSlot;
            uint256 requestsCount;
            uint256 dataFormat;
            bytes data;
        }

        struct ExitRequestsData {
            bytes data;
            uint256 dataFormat;
        }

        struct DeliveryHistory {
            uint256 timestamp;
            uint256 lastDeliveredKeyIndex;
        }

        event ExitDataProcessing(bytes32 indexed exitRequestsHash);

        function submitReportData(ReportData calldata data, uint256 contractVersion) external;
        function submitExitRequestsData(ExitRequestsData calldata request) external;
        function getExitRequestsDeliveryHistory(bytes32 exitRequestsHash)
            external
            view
            returns (DeliveryHistory[] memory);
    }

    #[sol(rpc)]
    contract StakingRouter {
        function getStakingModuleIds() external view returns (uint256[] memory);
        function getStakingModuleAddress(uint256 stakingModuleId) external view returns (address);
    }

    #[sol(rpc)]
    contract NodeOperatorsRegistry {
        function exitDeadlineThreshold(uint256 nodeOperatorId) external view returns (uint256);
        function isValidatorExitDelayPenaltyApplicable(
            uint256 nodeOperatorId,
            uint256 proofSlotTimestamp,
            bytes calldata publicKey,
            uint256 eligibleToExitInSec
        ) external view returns (bool);
    }

    #[sol(rpc)]
    contract ValidatorExitDelayVerifier {
        struct BeaconBlockHeader {
            uint64 slot;
            uint64 proposerIndex;
            bytes32 parentRoot;
            bytes32 stateRoot;
            bytes32 bodyRoot;
        }

        struct ProvableBeaconBlockHeader {
            BeaconBlockHeader header;
            uint64 rootsTimestamp;
        }

        struct HistoricalHeaderWitness {
            BeaconBlockHeader header;
            bytes32[] proof;
        }

        struct ValidatorWitness {
            uint32 exitRequestIndex;
            bytes32 withdrawalCredentials;
            uint64 effectiveBalance;
            bool slashed;
            uint64 activationEligibilityEpoch;
            uint64 activationEpoch;
            uint64 withdrawableEpoch;
            bytes32[] validatorProof;
            uint256 moduleId;
            uint256 nodeOperatorId;
            bytes pubkey;
        }

        struct ExitRequestsData {
            bytes data;
            uint256 dataFormat;
        }

        function SHARD_COMMITTEE_PERIOD_IN_SECONDS() external view returns (uint64);

        function verifyValidatorExitDelay(
            ProvableBeaconBlockHeader calldata beaconBlock,
            ValidatorWitness[] calldata witnesses,
            ExitRequestsData calldata exitRequestsData
        ) external;

        function verifyHistoricalValidatorExitDelay(
            ProvableBeaconBlockHeader calldata beaconBlock,
            HistoricalHeaderWitness calldata oldBlock,
            ValidatorWitness[] calldata witnesses,
            ExitRequestsData calldata exitRequestsData
        ) external;
    }
}

/// An `ExitDataProcessing` event occurrence.
#[derive(Debug, Clone)]
pub struct ExitDataEvent {
    pub exit_requests_hash: B256,
    pub transaction_hash: B256,
    pub block_number: u64,
}

/// Resolved addresses plus the typed call surface the prover consumes.
#[derive(Debug, Clone)]
pub struct Contracts {
    provider: DynProvider,
    pub verifier: Address,
    pub oracle: Address,
    pub staking_router: Address,
    registries: HashMap<u64, Address>,
}

impl Contracts {
    /// Resolve every address through the locator and build the module
    /// dispatch table.
    #[instrument(skip(provider))]
    pub async fn resolve(provider: DynProvider, locator_address: Address) -> Result<Self> {
        let locator = LidoLocator::new(locator_address, provider.clone());
        let verifier = locator
            .validatorExitDelayVerifier()
            .call()
            .await
            .context("resolving exit-delay verifier address")?;
        let oracle = locator
            .validatorsExitBusOracle()
            .call()
            .await
            .context("resolving exit bus oracle address")?;
        let staking_router = locator
            .stakingRouter()
            .call()
            .await
            .context("resolving staking router address")?;

        let router = StakingRouter::new(staking_router, provider.clone());
        let module_ids = router
            .getStakingModuleIds()
            .call()
            .await
            .context("listing staking modules")?;

        let mut registries = HashMap::new();
        for id in module_ids {
            let module_id = id.to::<u64>();
            let address = router
                .getStakingModuleAddress(id)
                .call()
                .await
                .with_context(|| format!("resolving registry for module {module_id}"))?;
            registries.insert(module_id, address);
        }

        info!(
            %verifier,
            %oracle,
            %staking_router,
            modules = registries.len(),
            "resolved contract addresses"
        );
        Ok(Self {
            provider,
            verifier,
            oracle,
            staking_router,
            registries,
        })
    }

    /// The verifier's shard committee period, read once at init.
    pub async fn shard_committee_period_seconds(&self) -> Result<u64> {
        ValidatorExitDelayVerifier::new(self.verifier, self.provider.clone())
            .SHARD_COMMITTEE_PERIOD_IN_SECONDS()
            .call()
            .await
            .context("reading SHARD_COMMITTEE_PERIOD_IN_SECONDS")
    }

    /// Registry address for a module id. An unknown module is a
    /// configuration mismatch, not a transient condition.
    pub fn registry(&self, module_id: u64) -> Result<Address> {
        match self.registries.get(&module_id) {
            Some(address) => Ok(*address),
            None => bail!("no node-operator registry for module {module_id}"),
        }
    }

    #[must_use]
    pub fn module_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.registries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// `ExitDataProcessing` events in `[from_block, to_block]`.
    pub async fn exit_data_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ExitDataEvent>> {
        let filter = Filter::new()
            .address(self.oracle)
            .event_signature(ValidatorsExitBusOracle::ExitDataProcessing::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .context("fetching ExitDataProcessing logs")?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let decoded = match log.log_decode::<ValidatorsExitBusOracle::ExitDataProcessing>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(error = %e, "undecodable ExitDataProcessing log, skipping");
                    continue;
                }
            };
            let (Some(transaction_hash), Some(block_number)) =
                (log.transaction_hash, log.block_number)
            else {
                warn!("ExitDataProcessing log without tx context, skipping");
                continue;
            };
            events.push(ExitDataEvent {
                exit_requests_hash: decoded.inner.data.exitRequestsHash,
                transaction_hash,
                block_number,
            });
        }
        Ok(events)
    }

    /// Pull the issuing transaction, require a successful receipt, and
    /// try-decode its input as `submitReportData` first, then
    /// `submitExitRequestsData`. Unrecognized selectors yield `None`.
    pub async fn fetch_exit_payload(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<(Vec<u8>, u64)>> {
        let receipt = self
            .provider
            .get_transaction_receipt(transaction_hash)
            .await
            .context("fetching exit-data transaction receipt")?;
        match receipt {
            Some(receipt) if receipt.status() => {}
            Some(_) => {
                warn!(%transaction_hash, "exit-data transaction reverted, skipping");
                return Ok(None);
            }
            None => {
                warn!(%transaction_hash, "exit-data transaction has no receipt, skipping");
                return Ok(None);
            }
        }

        let transaction = self
            .provider
            .get_transaction_by_hash(transaction_hash)
            .await
            .context("fetching exit-data transaction")?
            .with_context(|| format!("transaction {transaction_hash} not found"))?;
        let input = transaction.input();

        if let Ok(call) = ValidatorsExitBusOracle::submitReportDataCall::abi_decode(input) {
            return Ok(Some((call.data.data.to_vec(), call.data.dataFormat.to::<u64>())));
        }
        if let Ok(call) = ValidatorsExitBusOracle::submitExitRequestsDataCall::abi_decode(input) {
            return Ok(Some((
                call.request.data.to_vec(),
                call.request.dataFormat.to::<u64>(),
            )));
        }

        warn!(%transaction_hash, "unrecognized oracle call selector, skipping");
        Ok(None)
    }

    /// Delivery timestamp of an exit request, by hash. The oracle records
    /// a history per hash; the latest entry anchors deadline arithmetic.
    pub async fn delivery_timestamp(&self, exit_requests_hash: B256) -> Result<u64> {
        let history = ValidatorsExitBusOracle::new(self.oracle, self.provider.clone())
            .getExitRequestsDeliveryHistory(exit_requests_hash)
            .call()
            .await
            .context("fetching exit request delivery history")?;
        let last = history
            .last()
            .with_context(|| format!("no delivery recorded for {exit_requests_hash}"))?;
        Ok(last.timestamp.to::<u64>())
    }

    /// Per-operator exit deadline threshold, in seconds.
    pub async fn exit_deadline_threshold(&self, module_id: u64, node_op_id: u64) -> Result<u64> {
        let registry = self.registry(module_id)?;
        let threshold = NodeOperatorsRegistry::new(registry, self.provider.clone())
            .exitDeadlineThreshold(U256::from(node_op_id))
            .call()
            .await
            .with_context(|| {
                format!("reading exit deadline threshold for module {module_id} op {node_op_id}")
            })?;
        Ok(threshold.to::<u64>())
    }

    /// Whether a delay penalty still applies to this validator.
    pub async fn penalty_applicable(
        &self,
        module_id: u64,
        node_op_id: u64,
        proof_slot_timestamp: u64,
        pubkey: &[u8; 48],
        seconds_since_eligible: u64,
    ) -> Result<bool> {
        let registry = self.registry(module_id)?;
        let applicable = NodeOperatorsRegistry::new(registry, self.provider.clone())
            .isValidatorExitDelayPenaltyApplicable(
                U256::from(node_op_id),
                U256::from(proof_slot_timestamp),
                Bytes::copy_from_slice(pubkey),
                U256::from(seconds_since_eligible),
            )
            .call()
            .await
            .with_context(|| {
                format!("penalty applicability check for module {module_id} op {node_op_id}")
            })?;
        debug!(module_id, node_op_id, applicable, "penalty applicability checked");
        Ok(applicable)
    }
}

/// Calldata for the current-mode verification entry point.
#[must_use]
pub fn encode_verify_current(
    beacon_block: ValidatorExitDelayVerifier::ProvableBeaconBlockHeader,
    witnesses: Vec<ValidatorExitDelayVerifier::ValidatorWitness>,
    exit_requests: ValidatorExitDelayVerifier::ExitRequestsData,
) -> Bytes {
    ValidatorExitDelayVerifier::verifyValidatorExitDelayCall {
        beaconBlock: beacon_block,
        witnesses,
        exitRequestsData: exit_requests,
    }
    .abi_encode()
    .into()
}

/// Calldata for the historical-mode verification entry point.
#[must_use]
pub fn encode_verify_historical(
    beacon_block: ValidatorExitDelayVerifier::ProvableBeaconBlockHeader,
    old_block: ValidatorExitDelayVerifier::HistoricalHeaderWitness,
    witnesses: Vec<ValidatorExitDelayVerifier::ValidatorWitness>,
    exit_requests: ValidatorExitDelayVerifier::ExitRequestsData,
) -> Bytes {
    ValidatorExitDelayVerifier::verifyHistoricalValidatorExitDelayCall {
        beaconBlock: beacon_block,
        oldBlock: old_block,
        witnesses,
        exitRequestsData: exit_requests,
    }
    .abi_encode()
    .into()
}

/// Convert a consensus-layer header into its ABI shape.
#[must_use]
pub fn sol_header(
    header: &proof_gen::BeaconBlockHeader,
) -> ValidatorExitDelayVerifier::BeaconBlockHeader {
    ValidatorExitDelayVerifier::BeaconBlockHeader {
        slot: header.slot,
        proposerIndex: header.proposer_index,
        parentRoot: B256::from(header.parent_root),
        stateRoot: B256::from(header.state_root),
        bodyRoot: B256::from(header.body_root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    fn witness(index: u32) -> ValidatorExitDelayVerifier::ValidatorWitness {
        ValidatorExitDelayVerifier::ValidatorWitness {
            exitRequestIndex: index,
            withdrawalCredentials: B256::repeat_byte(1),
            effectiveBalance: 32_000_000_000,
            slashed: false,
            activationEligibilityEpoch: 99,
            activationEpoch: 100,
            withdrawableEpoch: u64::MAX,
            validatorProof: vec![B256::repeat_byte(2); 47],
            moduleId: U256::from(1),
            nodeOperatorId: U256::from(7),
            pubkey: Bytes::from(vec![0xaa; 48]),
        }
    }

    fn provable_header() -> ValidatorExitDelayVerifier::ProvableBeaconBlockHeader {
        ValidatorExitDelayVerifier::ProvableBeaconBlockHeader {
            header: ValidatorExitDelayVerifier::BeaconBlockHeader {
                slot: 100,
                proposerIndex: 1,
                parentRoot: B256::repeat_byte(3),
                stateRoot: B256::repeat_byte(4),
                bodyRoot: B256::repeat_byte(5),
            },
            rootsTimestamp: 1_700_000_000,
        }
    }

    #[test]
    fn current_mode_calldata_has_selector() {
        let calldata = encode_verify_current(
            provable_header(),
            vec![witness(0)],
            ValidatorExitDelayVerifier::ExitRequestsData {
                data: Bytes::from(vec![0u8; 64]),
                dataFormat: U256::from(1),
            },
        );
        assert_eq!(
            &calldata[..4],
            ValidatorExitDelayVerifier::verifyValidatorExitDelayCall::SELECTOR
        );
        let decoded =
            ValidatorExitDelayVerifier::verifyValidatorExitDelayCall::abi_decode(&calldata)
                .expect("self-decode");
        assert_eq!(decoded.witnesses.len(), 1);
        assert_eq!(decoded.witnesses[0].withdrawableEpoch, u64::MAX);
    }

    #[test]
    fn historical_mode_calldata_roundtrips() {
        let calldata = encode_verify_historical(
            provable_header(),
            ValidatorExitDelayVerifier::HistoricalHeaderWitness {
                header: provable_header().header,
                proof: vec![B256::repeat_byte(9); 45],
            },
            vec![witness(3)],
            ValidatorExitDelayVerifier::ExitRequestsData {
                data: Bytes::from(vec![1u8; 128]),
                dataFormat: U256::from(1),
            },
        );
        let decoded =
            ValidatorExitDelayVerifier::verifyHistoricalValidatorExitDelayCall::abi_decode(
                &calldata,
            )
            .expect("self-decode");
        assert_eq!(decoded.oldBlock.proof.len(), 45);
        assert_eq!(decoded.witnesses[0].exitRequestIndex, 3);
    }

    #[test]
    fn sol_header_copies_fields() {
        let header = proof_gen::BeaconBlockHeader {
            slot: 42,
            proposer_index: 7,
            parent_root: [1u8; 32],
            state_root: [2u8; 32],
            body_root: [3u8; 32],
        };
        let converted = sol_header(&header);
        assert_eq!(converted.slot, 42);
        assert_eq!(converted.stateRoot, B256::repeat_byte(2));
    }

    #[test]
    fn witness_abi_shape_is_stable() {
        // The struct encodes standalone; a change in field order or types
        // would alter the encoding and break the verifier interface.
        let encoded = witness(1).abi_encode();
        assert!(!encoded.is_empty());
        let decoded =
            ValidatorExitDelayVerifier::ValidatorWitness::abi_decode(&encoded).expect("decode");
        assert_eq!(decoded.exitRequestIndex, 1);
        assert_eq!(decoded.validatorProof.len(), 47);
    }
}
