//! Transaction Executor
//!
//! Runs one submission through emulate -> estimate -> cap -> sign ->
//! submit -> confirm. Gas rejection loops inside the executor after a
//! fixed delay; every other failure is surfaced to the caller with a
//! typed kind.

use crate::gas::GasManager;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Typed failure kinds of a submission attempt.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The read-only call with the same arguments reverted; sending would
    /// burn gas on a guaranteed revert. Not retried.
    #[error("emulation failed: {0}")]
    EmulationFailed(String),

    /// Emulation-only deployment; terminates the execute loop.
    #[error("no transaction signer configured")]
    NoSigner,

    /// The buffered estimate cannot fit under the configured hard limit;
    /// the caller must shrink the payload.
    #[error(
        "gas limit exceeded: buffered estimate {estimated_with_buffer} above limit {limit}, \
         requires at least {estimated_with_buffer}"
    )]
    GasLimitExceeded {
        estimated_with_buffer: u64,
        limit: u64,
    },

    #[error("transaction send failed: {0}")]
    SendFailed(String),

    /// Gas-manager RPC failures and other environment errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One prepared submission.
#[derive(Debug, Clone)]
pub struct TxPayload {
    pub label: String,
    pub to: Address,
    pub input: Bytes,
}

/// Result of a successful execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Dry-run mode: emulated and logged, nothing sent.
    DryRun,
    Confirmed { tx_hash: B256, gas_used: u64 },
}

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub dry_run: bool,
    /// Hard upper bound on gas; payloads whose buffered estimate exceeds
    /// it are rejected before sending.
    pub gas_limit: u64,
    pub confirmations: u64,
    pub mining_timeout: Duration,
    /// Sleep between high-gas retries.
    pub retry_delay: Duration,
}

/// Gas estimate with a 20 % buffer, rounded down.
#[must_use]
pub fn buffered_gas(estimate: u64) -> u64 {
    estimate.saturating_mul(6) / 5
}

/// The hard cap allows equality: a buffered estimate exactly at the limit
/// still sends.
pub fn check_gas_cap(estimated_with_buffer: u64, limit: u64) -> Result<(), ExecutorError> {
    if estimated_with_buffer > limit {
        return Err(ExecutorError::GasLimitExceeded {
            estimated_with_buffer,
            limit,
        });
    }
    Ok(())
}

pub struct TransactionExecutor {
    provider: DynProvider,
    signer_address: Option<Address>,
    config: ExecutorConfig,
}

impl TransactionExecutor {
    #[must_use]
    pub fn new(
        provider: DynProvider,
        signer_address: Option<Address>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            signer_address,
            config,
        }
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Execute one payload. High gas loops here after `retry_delay`;
    /// every other error surfaces.
    pub async fn execute(
        &self,
        gas: &mut GasManager,
        payload: &TxPayload,
    ) -> Result<ExecuteOutcome, ExecutorError> {
        let mut high_gas_waits = 0u32;
        loop {
            let mut tx = TransactionRequest::default()
                .with_to(payload.to)
                .with_input(payload.input.clone());
            if let Some(from) = self.signer_address {
                tx = tx.with_from(from);
            }

            self.provider
                .call(tx.clone())
                .await
                .map_err(|e| ExecutorError::EmulationFailed(e.to_string()))?;
            debug!(label = %payload.label, "emulation succeeded");

            if self.config.dry_run {
                info!(
                    label = %payload.label,
                    to = %payload.to,
                    calldata_bytes = payload.input.len(),
                    "dry run: transaction resolved, not sending"
                );
                return Ok(ExecuteOutcome::DryRun);
            }

            if self.signer_address.is_none() {
                return Err(ExecutorError::NoSigner);
            }

            let estimated = match self.provider.estimate_gas(tx.clone()).await {
                Ok(estimated) => estimated,
                Err(e) => {
                    warn!(
                        label = %payload.label,
                        error = %e,
                        fallback = self.config.gas_limit,
                        "gas estimation failed, falling back to the hard limit"
                    );
                    self.config.gas_limit
                }
            };
            let estimated_with_buffer = buffered_gas(estimated);
            check_gas_cap(estimated_with_buffer, self.config.gas_limit)?;

            let decision = gas.check_gas().await?;
            if !decision.acceptable {
                high_gas_waits += 1;
                warn!(
                    label = %payload.label,
                    current = decision.current_base_fee,
                    threshold = decision.threshold,
                    waits = high_gas_waits,
                    "base fee above acceptability threshold, waiting"
                );
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }

            let fees = gas.tx_fees().await?;
            let tx = tx
                .with_gas_limit(estimated_with_buffer)
                .with_max_fee_per_gas(fees.max_fee_per_gas)
                .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

            let pending = self
                .provider
                .send_transaction(tx)
                .await
                .map_err(|e| ExecutorError::SendFailed(e.to_string()))?;
            let tx_hash = *pending.tx_hash();
            info!(label = %payload.label, %tx_hash, "transaction submitted");

            let receipt = pending
                .with_required_confirmations(self.config.confirmations)
                .with_timeout(Some(self.config.mining_timeout))
                .get_receipt()
                .await
                .map_err(|e| ExecutorError::SendFailed(e.to_string()))?;
            if !receipt.status() {
                return Err(ExecutorError::SendFailed(format!(
                    "transaction {tx_hash} reverted"
                )));
            }

            info!(
                label = %payload.label,
                %tx_hash,
                gas_used = receipt.gas_used,
                "transaction confirmed"
            );
            return Ok(ExecuteOutcome::Confirmed {
                tx_hash,
                gas_used: receipt.gas_used,
            });
        }
    }
}
