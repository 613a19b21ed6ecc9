//! Prover Core
//!
//! One cycle has two passes. Accumulation scans the execution-chain range
//! for oracle exit-request events, resolves each validator's exit
//! deadline, and files it in the store. Verification walks every deadline
//! slot at or before the finalized slot, builds witnesses for validators
//! still unexited past their deadline, and submits them to the verifier —
//! through the deadline block's own header while the slot is recent, or
//! through a historical-summary witness once it has aged out.

use crate::contracts::{
    encode_verify_current, encode_verify_historical, sol_header, Contracts,
    ValidatorExitDelayVerifier as verifier,
};
use crate::deadlines::{
    eligible_exit_timestamp, exit_deadline_slot, BeaconConfig, ThresholdCache,
};
use crate::decoder::{decode_exit_requests, DecodedValidator};
use crate::executor::{ExecuteOutcome, TransactionExecutor, TxPayload};
use crate::gas::GasManager;
use crate::state::AppState;
use crate::store::{
    DeadlineGroup, ExitRequestData, ReportedSet, TrackedValidator, ValidatorStore,
};
use alloy::primitives::{Bytes, B256, U256};
use anyhow::{Context, Result};
use proof_gen::gindex::{is_slot_old, root_index_in_summary, slot_of_summary, summary_index};
use proof_gen::{
    BeaconClient, BeaconClientError, BeaconHeaderInfo, BeaconStateView, BlockId,
    HistoricalProofBuilder, ValidatorProofBuilder,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Block span per `eth_getLogs` request.
const LOG_RANGE_BLOCKS: u64 = 10_000;

/// Slots tried past a missing deadline block.
const SKIP_SLOT_ATTEMPTS: u32 = 32;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Both passes ran to completion; progress may be persisted.
    Completed,
    /// The finalized state did not deserialize; nothing was processed and
    /// progress must not be persisted.
    AbortedCorruptState,
}

/// Batching limits for one submission.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub validators_per_tx: usize,
    pub max_tx_size_bytes: usize,
}

pub struct ProverCore {
    cl: BeaconClient,
    contracts: Contracts,
    executor: TransactionExecutor,
    gas: GasManager,
    config: BeaconConfig,
    limits: BatchLimits,
    store: ValidatorStore,
    reported: ReportedSet,
    app: AppState,
}

impl ProverCore {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        cl: BeaconClient,
        contracts: Contracts,
        executor: TransactionExecutor,
        gas: GasManager,
        config: BeaconConfig,
        limits: BatchLimits,
        app: AppState,
    ) -> Self {
        Self {
            cl,
            contracts,
            executor,
            gas,
            config,
            limits,
            store: ValidatorStore::new(),
            reported: ReportedSet::new(),
            app,
        }
    }

    /// Run one accumulate-and-verify cycle over the EL block range.
    #[instrument(skip(self))]
    pub async fn run_cycle(
        &mut self,
        prev_el_block: u64,
        latest_el_block: u64,
    ) -> Result<CycleOutcome> {
        let finalized_header = self
            .cl
            .get_beacon_header(BlockId::Finalized)
            .await
            .context("fetching finalized header")?;
        let finalized_slot = finalized_header.header.slot;
        self.app.set_finalized_slot(finalized_slot);

        let finalized_state = match self.cl.get_state_view(BlockId::Slot(finalized_slot)).await {
            Ok(view) => view,
            Err(BeaconClientError::StateDeserialization(message)) => {
                // Beacon-node data corruption, not a bug here: end the
                // cycle without persisting so the next one retries.
                warn!(finalized_slot, %message, "finalized state undecodable, ending cycle");
                return Ok(CycleOutcome::AbortedCorruptState);
            }
            Err(other) => return Err(other).context("fetching finalized state"),
        };

        self.accumulate(prev_el_block, latest_el_block, &finalized_state)
            .await?;
        self.verify_pending(&finalized_header, &finalized_state)
            .await?;

        self.store.cleanup(finalized_slot, &self.reported);
        self.app.set_store_stats(&self.store.stats());
        self.app.set_reported_pubkeys(self.reported.len());
        Ok(CycleOutcome::Completed)
    }

    /// Accumulation pass: decode new exit requests and file validators by
    /// exit deadline slot.
    async fn accumulate(
        &mut self,
        from_block: u64,
        to_block: u64,
        finalized_state: &BeaconStateView,
    ) -> Result<()> {
        let mut thresholds = ThresholdCache::new();
        let mut new_validators = 0usize;

        for (start, end) in block_ranges(from_block, to_block, LOG_RANGE_BLOCKS) {
            let events = self.contracts.exit_data_events(start, end).await?;
            debug!(start, end, events = events.len(), "scanned exit-data events");

            for event in events {
                let Some((data, data_format)) = self
                    .contracts
                    .fetch_exit_payload(event.transaction_hash)
                    .await?
                else {
                    continue;
                };
                let delivered_at = self
                    .contracts
                    .delivery_timestamp(event.exit_requests_hash)
                    .await?;

                let decoded = match decode_exit_requests(&data) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!(
                            hash = %event.exit_requests_hash,
                            error = %e,
                            "malformed exit data, skipping event"
                        );
                        continue;
                    }
                };

                let request = Arc::new(ExitRequestData {
                    exit_requests_hash: event.exit_requests_hash,
                    data,
                    data_format,
                    delivered_at,
                });

                let mut by_slot: BTreeMap<u64, Vec<TrackedValidator>> = BTreeMap::new();
                for validator in decoded {
                    match self
                        .resolve_deadline(&validator, delivered_at, finalized_state, &mut thresholds)
                        .await?
                    {
                        Some((deadline_slot, tracked)) => {
                            by_slot.entry(deadline_slot).or_default().push(tracked);
                        }
                        None => continue,
                    }
                }

                for (deadline_slot, validators) in by_slot {
                    new_validators += validators.len();
                    self.store.add(
                        deadline_slot,
                        DeadlineGroup {
                            request: Arc::clone(&request),
                            validators,
                        },
                    );
                }
            }
        }

        if new_validators > 0 {
            info!(new_validators, "accumulated exit requests");
        }
        Ok(())
    }

    async fn resolve_deadline(
        &self,
        validator: &DecodedValidator,
        delivered_at: u64,
        finalized_state: &BeaconStateView,
        thresholds: &mut ThresholdCache,
    ) -> Result<Option<(u64, TrackedValidator)>> {
        let Some(on_chain) = finalized_state.validator(validator.validator_index) else {
            warn!(
                validator_index = validator.validator_index,
                "exit request names an unknown validator index, skipping"
            );
            return Ok(None);
        };

        let threshold = match thresholds.get(validator.module_id, validator.node_op_id) {
            Some(threshold) => threshold,
            None => {
                let threshold = self
                    .contracts
                    .exit_deadline_threshold(validator.module_id, validator.node_op_id)
                    .await?;
                thresholds.insert(validator.module_id, validator.node_op_id, threshold);
                threshold
            }
        };

        let eligible_exit_at =
            eligible_exit_timestamp(&self.config, delivered_at, on_chain.activation_epoch);
        let deadline_slot = exit_deadline_slot(&self.config, eligible_exit_at, threshold);

        Ok(Some((
            deadline_slot,
            TrackedValidator {
                exit_data_index: validator.exit_data_index,
                module_id: validator.module_id,
                node_op_id: validator.node_op_id,
                validator_index: validator.validator_index,
                pubkey: validator.pubkey,
                activation_epoch: on_chain.activation_epoch,
                eligible_exit_at,
                exit_deadline_epoch: self.config.epoch_of_slot(deadline_slot),
            },
        )))
    }

    /// Verification pass: prove and submit every eligible deadline slot,
    /// in ascending order.
    async fn verify_pending(
        &mut self,
        finalized_header: &BeaconHeaderInfo,
        finalized_state: &BeaconStateView,
    ) -> Result<()> {
        let finalized_slot = finalized_state.slot();
        let eligible = self.store.eligible_slots(finalized_slot);
        if eligible.is_empty() {
            return Ok(());
        }
        info!(slots = eligible.len(), finalized_slot, "processing eligible deadline slots");

        // The historical builder hashes the whole finalized state once;
        // shared across every old slot in this cycle.
        let mut historical: Option<HistoricalProofBuilder> = None;

        for deadline_slot in eligible {
            self.process_deadline_slot(
                deadline_slot,
                finalized_header,
                finalized_state,
                &mut historical,
            )
            .await?;
        }
        Ok(())
    }

    async fn process_deadline_slot(
        &mut self,
        deadline_slot: u64,
        finalized_header: &BeaconHeaderInfo,
        finalized_state: &BeaconStateView,
        historical: &mut Option<HistoricalProofBuilder>,
    ) -> Result<()> {
        let Some(groups) = self.store.groups(deadline_slot).map(<[DeadlineGroup]>::to_vec)
        else {
            return Ok(());
        };

        // The deadline block itself proves nothing: the validator must be
        // observed *past* the deadline. Missed slots advance the proof
        // slot further.
        let penalizable_slot = deadline_slot + 1;
        let (proof_slot, deadline_header) = self
            .cl
            .find_next_available_slot(penalizable_slot, SKIP_SLOT_ATTEMPTS)
            .await
            .context("locating block past the exit deadline")?;
        let proof_slot_timestamp = self.config.slot_start_timestamp(proof_slot);

        let deadline_state = match self.cl.get_state_view(BlockId::Slot(proof_slot)).await {
            Ok(view) => view,
            Err(BeaconClientError::StateDeserialization(message)) => {
                warn!(deadline_slot, proof_slot, %message, "deadline state undecodable, skipping group");
                return Ok(());
            }
            Err(other) => return Err(other).context("fetching deadline state"),
        };

        let builder =
            ValidatorProofBuilder::for_state(&deadline_state).context("building validator prover")?;
        if builder.state_root() != deadline_header.header.state_root {
            anyhow::bail!(
                "recomputed state root does not match header at slot {proof_slot}; \
                 refusing to build proofs"
            );
        }

        // Mode is a property of the deadline slot, never of a batch: once
        // the slot has aged past the block-roots window, every batch for
        // it goes through the historical entry point.
        let old_mode = is_slot_old(
            deadline_slot,
            finalized_state.slot(),
            self.config.slots_per_historical_root,
        );
        let old_block = if old_mode {
            Some(
                self.build_historical_witness(
                    proof_slot,
                    &deadline_header,
                    finalized_state,
                    historical,
                )
                .await?,
            )
        } else {
            None
        };

        for group in groups {
            let witnesses = self
                .collect_witnesses(&group, &deadline_state, &builder, proof_slot_timestamp)
                .await?;
            if witnesses.is_empty() {
                continue;
            }

            let exit_requests = verifier::ExitRequestsData {
                data: Bytes::from(group.request.data.clone()),
                dataFormat: U256::from(group.request.data_format),
            };

            let encode_batch = |batch: &[verifier::ValidatorWitness]| match &old_block {
                Some(old_block) => encode_verify_historical(
                    provable_header(finalized_header, finalized_header.header.slot, &self.config),
                    old_block.clone(),
                    batch.to_vec(),
                    exit_requests.clone(),
                ),
                None => encode_verify_current(
                    provable_header(&deadline_header, proof_slot, &self.config),
                    batch.to_vec(),
                    exit_requests.clone(),
                ),
            };

            let batches = bounded_batches(
                &witnesses,
                self.limits.validators_per_tx,
                self.limits.max_tx_size_bytes,
                |batch| encode_batch(batch).len(),
            );
            info!(
                deadline_slot,
                proof_slot,
                mode = if old_mode { "historical" } else { "current" },
                witnesses = witnesses.len(),
                batches = batches.len(),
                "submitting exit-delay proofs"
            );

            for batch in batches {
                let payload = TxPayload {
                    label: if old_mode {
                        format!("verifyHistoricalValidatorExitDelay(slot {deadline_slot})")
                    } else {
                        format!("verifyValidatorExitDelay(slot {deadline_slot})")
                    },
                    to: self.contracts.verifier,
                    input: encode_batch(&batch),
                };

                let outcome = self
                    .executor
                    .execute(&mut self.gas, &payload)
                    .await
                    .map_err(anyhow::Error::new)?;
                if let ExecuteOutcome::Confirmed { .. } = outcome {
                    self.app.record_submission_confirmed();
                    for witness in &batch {
                        let mut pubkey = [0u8; 48];
                        pubkey.copy_from_slice(&witness.pubkey);
                        self.reported.insert(pubkey);
                    }
                }
            }
        }
        Ok(())
    }

    /// Filter one group down to provable witnesses.
    async fn collect_witnesses(
        &mut self,
        group: &DeadlineGroup,
        deadline_state: &BeaconStateView,
        builder: &ValidatorProofBuilder,
        proof_slot_timestamp: u64,
    ) -> Result<Vec<verifier::ValidatorWitness>> {
        let mut witnesses = Vec::new();
        for tracked in &group.validators {
            let Some(on_chain) = deadline_state.validator(tracked.validator_index) else {
                warn!(
                    validator_index = tracked.validator_index,
                    "validator missing from deadline state, skipping"
                );
                continue;
            };
            if on_chain.pubkey[..] != tracked.pubkey[..] {
                warn!(
                    validator_index = tracked.validator_index,
                    "pubkey mismatch between exit request and state, skipping"
                );
                continue;
            }
            // Exited before the deadline epoch: nothing to penalize.
            if on_chain.exit_epoch < tracked.exit_deadline_epoch {
                debug!(
                    validator_index = tracked.validator_index,
                    exit_epoch = on_chain.exit_epoch,
                    "validator exited in time, skipping"
                );
                continue;
            }
            if proof_slot_timestamp < tracked.eligible_exit_at {
                debug!(
                    validator_index = tracked.validator_index,
                    "validator not yet eligible at proof slot, skipping"
                );
                continue;
            }

            let applicable = self
                .contracts
                .penalty_applicable(
                    tracked.module_id,
                    tracked.node_op_id,
                    proof_slot_timestamp,
                    &tracked.pubkey,
                    proof_slot_timestamp - tracked.eligible_exit_at,
                )
                .await?;
            if !applicable {
                if self.reported.contains(&tracked.pubkey) {
                    self.reported.remove(&tracked.pubkey);
                    debug!(
                        validator_index = tracked.validator_index,
                        "penalty no longer applicable, dropped from reported set"
                    );
                }
                continue;
            }

            let proof = builder
                .prove_validator(tracked.validator_index)
                .context("validator proof construction")?;

            witnesses.push(verifier::ValidatorWitness {
                exitRequestIndex: tracked.exit_data_index,
                withdrawalCredentials: B256::from(on_chain.withdrawal_credentials),
                effectiveBalance: on_chain.effective_balance,
                slashed: on_chain.slashed,
                activationEligibilityEpoch: on_chain.activation_eligibility_epoch,
                activationEpoch: on_chain.activation_epoch,
                withdrawableEpoch: on_chain.withdrawable_epoch,
                validatorProof: proof.branch.iter().map(|w| B256::from(*w)).collect(),
                moduleId: U256::from(tracked.module_id),
                nodeOperatorId: U256::from(tracked.node_op_id),
                pubkey: Bytes::copy_from_slice(&tracked.pubkey),
            });
        }
        Ok(witnesses)
    }

    /// Prove the deadline block's root into the finalized state's
    /// historical summaries and wrap the deadline header as the old-block
    /// witness. Computed once per deadline slot.
    async fn build_historical_witness(
        &mut self,
        proof_slot: u64,
        deadline_header: &BeaconHeaderInfo,
        finalized_state: &BeaconStateView,
        historical: &mut Option<HistoricalProofBuilder>,
    ) -> Result<verifier::HistoricalHeaderWitness> {
        let capella_slot = self.config.capella_fork_slot();
        let sphr = self.config.slots_per_historical_root;
        let index = summary_index(proof_slot, capella_slot, sphr);
        let summary_slot = slot_of_summary(index, capella_slot, sphr);
        let root_index = root_index_in_summary(proof_slot, sphr);

        let summary_state = self
            .cl
            .get_state_view(BlockId::Slot(summary_slot))
            .await
            .context("fetching historical summary state")?;

        if historical.is_none() {
            *historical = Some(
                HistoricalProofBuilder::for_state(finalized_state)
                    .context("building historical prover")?,
            );
        }
        let builder = historical.as_ref().expect("historical builder just set");

        let proof = builder
            .prove_block_root(index, root_index, summary_state.block_roots())
            .context("historical proof construction")?;
        if proof.leaf != deadline_header.root {
            anyhow::bail!(
                "historical summary does not contain the deadline block root at slot {proof_slot}"
            );
        }

        Ok(verifier::HistoricalHeaderWitness {
            header: sol_header(&deadline_header.header),
            proof: proof.branch.iter().map(|w| B256::from(*w)).collect(),
        })
    }

    #[must_use]
    pub fn store_stats(&self) -> crate::store::StoreStats {
        self.store.stats()
    }

    #[must_use]
    pub fn reported_len(&self) -> usize {
        self.reported.len()
    }
}

/// The submitted deadline header: the block actually found past the
/// deadline, stamped with the timestamp of the following slot.
fn provable_header(
    header: &BeaconHeaderInfo,
    proof_slot: u64,
    config: &BeaconConfig,
) -> verifier::ProvableBeaconBlockHeader {
    verifier::ProvableBeaconBlockHeader {
        header: sol_header(&header.header),
        rootsTimestamp: config.slot_start_timestamp(proof_slot + 1),
    }
}

/// Split `[from, to]` into inclusive subranges of at most `span` blocks.
fn block_ranges(from: u64, to: u64, span: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = to.min(start + span - 1);
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

/// Chunk witnesses by the validator batch size, then keep halving any
/// chunk whose encoded payload exceeds the calldata ceiling.
fn bounded_batches<W: Clone>(
    witnesses: &[W],
    batch_size: usize,
    max_bytes: usize,
    payload_size: impl Fn(&[W]) -> usize,
) -> Vec<Vec<W>> {
    let mut queue: VecDeque<Vec<W>> = witnesses
        .chunks(batch_size.max(1))
        .map(<[W]>::to_vec)
        .collect();
    let mut batches = Vec::new();
    while let Some(batch) = queue.pop_front() {
        if batch.len() > 1 && payload_size(&batch) > max_bytes {
            let (left, right) = batch.split_at(batch.len() / 2);
            queue.push_front(right.to_vec());
            queue.push_front(left.to_vec());
        } else {
            batches.push(batch);
        }
    }
    batches
}
