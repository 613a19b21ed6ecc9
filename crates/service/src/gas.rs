//! Gas Manager
//!
//! Keeps a bounded history of base fees and decides whether current gas is
//! acceptable against a percentile of that history. Also computes the
//! EIP-1559 fee fields for outgoing transactions.

use alloy::eips::BlockNumberOrTag;
use alloy::providers::{DynProvider, Provider};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Largest block count a single `eth_feeHistory` call requests.
pub const MAX_FEE_HISTORY_BLOCKCOUNT: u64 = 1024;

/// Gas policy knobs.
#[derive(Debug, Clone)]
pub struct GasConfig {
    /// Days of base-fee history retained for the acceptability percentile.
    pub history_days: u64,
    /// Percentile of history the current base fee must not exceed.
    pub history_percentile: f64,
    /// Reward percentile used to source the priority fee.
    pub priority_fee_percentile: f64,
    /// Clamp bounds for the priority fee, in wei.
    pub min_priority_fee: u128,
    pub max_priority_fee: u128,
    /// Approximate blocks mined per hour; paces cache refreshes.
    pub blocks_per_hour: u64,
}

/// EIP-1559 fee fields for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFees {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Outcome of a gas acceptability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasDecision {
    pub acceptable: bool,
    pub current_base_fee: u128,
    pub threshold: u128,
}

/// Owns the base-fee history cache; refreshed lazily from the execution
/// client, at most once per `blocks_per_hour` window.
pub struct GasManager {
    provider: DynProvider,
    config: GasConfig,
    /// Base fees, oldest first.
    fee_history: Vec<u128>,
    last_refresh_block: u64,
}

impl GasManager {
    #[must_use]
    pub fn new(provider: DynProvider, config: GasConfig) -> Self {
        Self {
            provider,
            config,
            fee_history: Vec::new(),
            last_refresh_block: 0,
        }
    }

    /// Upper bound on retained history entries.
    #[must_use]
    pub fn max_cache_len(&self) -> usize {
        (self.config.history_days * 24 * self.config.blocks_per_hour) as usize
    }

    /// Refresh the cache if at least `blocks_per_hour` blocks have passed
    /// since the last refresh. Fetches in bounded batches, newest last,
    /// dropping the projected next-block entry each batch appends.
    pub async fn refresh_if_due(&mut self) -> Result<()> {
        let latest = self
            .provider
            .get_block_number()
            .await
            .context("fetching latest block number")?;

        let since_refresh = latest.saturating_sub(self.last_refresh_block);
        if self.last_refresh_block != 0 && since_refresh < self.config.blocks_per_hour {
            return Ok(());
        }

        let span = if self.last_refresh_block == 0 {
            self.max_cache_len() as u64
        } else {
            since_refresh.min(self.max_cache_len() as u64)
        };

        let mut segments: Vec<Vec<u128>> = Vec::new();
        let mut remaining = span;
        let mut end = latest;
        while remaining > 0 {
            let count = remaining.min(MAX_FEE_HISTORY_BLOCKCOUNT);
            let history = self
                .provider
                .get_fee_history(count, BlockNumberOrTag::Number(end), &[])
                .await
                .context("fetching fee history batch")?;
            let mut fees = history.base_fee_per_gas;
            // The response carries count+1 entries; the trailing one is
            // the next (unmined) block.
            fees.pop();
            segments.push(fees);
            end = end.saturating_sub(count);
            remaining -= count;
        }

        segments.reverse();
        let new_fees: Vec<u128> = segments.into_iter().flatten().collect();
        let fetched = new_fees.len();
        self.absorb_new_fees(new_fees);
        self.last_refresh_block = latest;
        debug!(
            latest,
            fetched,
            cached = self.fee_history.len(),
            "gas fee history refreshed"
        );
        Ok(())
    }

    /// Append newer fees and drop the oldest entries beyond the bound.
    fn absorb_new_fees(&mut self, new_fees: Vec<u128>) {
        self.fee_history.extend(new_fees);
        let max_len = self.max_cache_len();
        if self.fee_history.len() > max_len {
            let excess = self.fee_history.len() - max_len;
            self.fee_history.drain(..excess);
        }
    }

    /// Base fee of the latest block.
    pub async fn current_base_fee(&self) -> Result<u128> {
        let history = self
            .provider
            .get_fee_history(1, BlockNumberOrTag::Latest, &[])
            .await
            .context("fetching current base fee")?;
        history
            .base_fee_per_gas
            .first()
            .copied()
            .context("fee history returned no base fee")
    }

    /// Refresh if due, then compare the current base fee against the
    /// history percentile.
    pub async fn check_gas(&mut self) -> Result<GasDecision> {
        self.refresh_if_due().await?;
        let current = self.current_base_fee().await?;
        let threshold = percentile(&self.fee_history, self.config.history_percentile);
        Ok(GasDecision {
            acceptable: current <= threshold,
            current_base_fee: current,
            threshold,
        })
    }

    /// EIP-1559 fee fields: the reward percentile of the latest block,
    /// clamped, on top of twice the current base fee.
    pub async fn tx_fees(&self) -> Result<GasFees> {
        let history = self
            .provider
            .get_fee_history(
                1,
                BlockNumberOrTag::Latest,
                &[self.config.priority_fee_percentile],
            )
            .await
            .context("fetching priority fee reward")?;

        let base_fee = history
            .base_fee_per_gas
            .first()
            .copied()
            .context("fee history returned no base fee")?;
        let reward = history
            .reward
            .as_ref()
            .and_then(|rows| rows.first())
            .and_then(|row| row.first())
            .copied()
            .unwrap_or(self.config.min_priority_fee);

        let max_priority_fee_per_gas =
            reward.clamp(self.config.min_priority_fee, self.config.max_priority_fee);
        let fees = GasFees {
            max_fee_per_gas: 2 * base_fee + max_priority_fee_per_gas,
            max_priority_fee_per_gas,
        };
        info!(
            base_fee,
            max_fee = fees.max_fee_per_gas,
            priority_fee = fees.max_priority_fee_per_gas,
            "computed transaction fees"
        );
        Ok(fees)
    }

    #[must_use]
    pub fn cached_fees(&self) -> &[u128] {
        &self.fee_history
    }

    #[cfg(test)]
    fn test_instance(config: GasConfig, fees: Vec<u128>) -> Self {
        use alloy::providers::ProviderBuilder;
        let provider = ProviderBuilder::new()
            .connect_http("http://localhost:1".parse().unwrap())
            .erased();
        let mut manager = Self::new(provider, config);
        manager.fee_history = fees;
        manager
    }
}

/// Linear-interpolated percentile over an unordered slice. An empty slice
/// yields zero.
#[must_use]
pub fn percentile(values: &[u128], pct: f64) -> u128 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let clamped = pct.clamp(0.0, 100.0);
    let rank = clamped / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    let low = sorted[lower] as f64;
    let high = sorted[upper] as f64;
    (low + (high - low) * weight).round() as u128
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_two_elements_at_median() {
        assert_eq!(percentile(&[10, 20], 50.0), 15);
        assert_eq!(percentile(&[20, 10], 50.0), 15);
    }

    #[test]
    fn percentile_bounds_and_interpolation() {
        let values = [10, 20, 30, 40];
        assert_eq!(percentile(&values, 0.0), 10);
        assert_eq!(percentile(&values, 100.0), 40);
        // rank 1.5 between 20 and 30
        assert_eq!(percentile(&values, 50.0), 25);
        assert_eq!(percentile(&values, 25.0), 18); // rank 0.75 -> 17.5 rounded
    }

    #[test]
    fn percentile_degenerate_inputs() {
        assert_eq!(percentile(&[], 50.0), 0);
        assert_eq!(percentile(&[7], 99.0), 7);
        assert_eq!(percentile(&[5, 5, 5], 33.0), 5);
    }

    fn config() -> GasConfig {
        GasConfig {
            history_days: 1,
            history_percentile: 50.0,
            priority_fee_percentile: 25.0,
            min_priority_fee: 50_000_000,
            max_priority_fee: 10_000_000_000,
            blocks_per_hour: 300,
        }
    }

    #[test]
    fn cache_bound_is_days_times_blocks() {
        let manager = GasManager::test_instance(config(), vec![]);
        assert_eq!(manager.max_cache_len(), 7200);
    }

    #[test]
    fn absorb_truncates_oldest() {
        let mut manager = GasManager::test_instance(
            GasConfig {
                history_days: 1,
                blocks_per_hour: 1, // max_cache_len = 24
                ..config()
            },
            (0..20u128).collect(),
        );
        manager.absorb_new_fees((100..110u128).collect());

        let cached = manager.cached_fees();
        assert_eq!(cached.len(), 24);
        // Oldest six entries were dropped, newest land at the back.
        assert_eq!(cached[0], 6);
        assert_eq!(*cached.last().unwrap(), 109);
    }

    #[test]
    fn absorb_keeps_everything_under_bound() {
        let mut manager = GasManager::test_instance(
            GasConfig {
                history_days: 1,
                blocks_per_hour: 1,
                ..config()
            },
            vec![1, 2, 3],
        );
        manager.absorb_new_fees(vec![4, 5]);
        assert_eq!(manager.cached_fees(), &[1, 2, 3, 4, 5]);
    }
}
