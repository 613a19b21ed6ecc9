//! Cycle Driver
//!
//! The single-threaded daemon loop: pick the next `(prev, latest)` pair of
//! finalized roots, run one prover cycle over the corresponding execution
//! block range, persist progress on success, sleep, repeat. Failures are
//! logged once and the loop sleeps with an `error_recovery` mark.

use crate::errors::{ErrorReporter, TaggedError};
use crate::prover::{CycleOutcome, ProverCore};
use crate::roots::RootProvider;
use crate::state::AppState;
use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider};
use anyhow::{Context, Result};
use proof_gen::{BeaconClient, BeaconHeaderInfo, BlockId};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleStatus {
    /// A block range was processed.
    Processed,
    /// Nothing to do this round (no new finality, or roots unavailable).
    Idle,
}

pub struct CycleDriver {
    cl: BeaconClient,
    el: DynProvider,
    prover: ProverCore,
    roots: RootProvider,
    reporter: ErrorReporter,
    app: AppState,
    sleep_interval: Duration,
    dry_run: bool,
}

impl CycleDriver {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        cl: BeaconClient,
        el: DynProvider,
        prover: ProverCore,
        roots: RootProvider,
        reporter: ErrorReporter,
        app: AppState,
        sleep_interval: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            cl,
            el,
            prover,
            roots,
            reporter,
            app,
            sleep_interval,
            dry_run,
        }
    }

    /// Run cycles until the process is shut down.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.cycle_once().await {
                Ok(status) => {
                    self.app.set_error(None);
                    self.app.record_cycle_completed();
                    if status == CycleStatus::Idle {
                        self.app.count_sleep("idle");
                    }
                }
                Err(e) => {
                    let err = self.reporter.report(e);
                    let summary = err
                        .downcast_ref::<TaggedError>()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| format!("{err:#}"));
                    self.app.set_error(Some(summary));
                    self.app.count_sleep("error_recovery");
                }
            }
            tokio::time::sleep(self.sleep_interval).await;
        }
    }

    async fn cycle_once(&mut self) -> Result<CycleStatus> {
        let Some((prev, latest)) = self.roots.next_roots().await else {
            self.app.count_sleep("roots_unavailable");
            return Ok(CycleStatus::Idle);
        };

        if prev.root == latest.root {
            debug!(slot = latest.header.slot, "finality has not advanced");
            return Ok(CycleStatus::Idle);
        }

        let prev_el = self.el_block_number(&prev).await?;
        let latest_el = self.el_block_number(&latest).await?;
        info!(
            prev_slot = prev.header.slot,
            latest_slot = latest.header.slot,
            prev_el,
            latest_el,
            "starting cycle"
        );

        match self.prover.run_cycle(prev_el, latest_el).await? {
            CycleOutcome::Completed => {
                if self.dry_run {
                    info!("dry run: not persisting last processed root");
                } else {
                    self.roots.persist(&latest)?;
                }
                Ok(CycleStatus::Processed)
            }
            // Progress stays unpersisted so the next cycle retries the
            // same range.
            CycleOutcome::AbortedCorruptState => Ok(CycleStatus::Idle),
        }
    }

    /// Map a beacon block to its execution block number through the
    /// payload's block hash.
    async fn el_block_number(&self, header: &BeaconHeaderInfo) -> Result<u64> {
        let info = self
            .cl
            .get_block_info(BlockId::Root(header.root))
            .await
            .context("fetching beacon block info")?;
        let block = self
            .el
            .get_block_by_hash(B256::from(info.execution_block_hash))
            .await
            .context("fetching execution block")?
            .with_context(|| {
                format!(
                    "execution block 0x{} not found",
                    hex::encode(info.execution_block_hash)
                )
            })?;
        Ok(block.header.number)
    }
}
