//! Service Configuration
//!
//! All options are available as CLI flags and environment variables; a
//! `.env` file is honored when present. The daemon sleep interval has a
//! 10-second floor.

use crate::executor::ExecutorConfig;
use crate::gas::GasConfig;
use anyhow::{bail, Context, Result};
use clap::Parser;
use proof_gen::{BeaconClientConfig, ForkName};
use std::path::PathBuf;
use std::time::Duration;

/// Floor for the cycle sleep interval.
const MIN_DAEMON_SLEEP_MS: u64 = 10_000;

#[derive(Parser, Debug, Clone)]
#[command(name = "exit-delay-service")]
#[command(about = "Proves overdue validator exits to the on-chain exit-delay verifier")]
pub struct Args {
    /// Execution chain id
    #[arg(long, env = "CHAIN_ID", default_value_t = 1)]
    pub chain_id: u64,

    /// Fork assumed for SSZ states when the node omits the version header
    #[arg(long, env = "FORK_NAME", default_value = "electra")]
    pub fork_name: String,

    /// Ordered execution-layer RPC endpoints (comma separated)
    #[arg(long, env = "EL_RPC_URLS", value_delimiter = ',', required = true)]
    pub el_rpc_urls: Vec<String>,

    /// Ordered consensus-layer API endpoints (comma separated)
    #[arg(long, env = "CL_API_URLS", value_delimiter = ',', required = true)]
    pub cl_api_urls: Vec<String>,

    /// EL transport retry budget
    #[arg(long, env = "EL_RETRY_DELAY_MS", default_value_t = 1_000)]
    pub el_retry_delay_ms: u64,
    #[arg(long, env = "EL_MAX_RETRIES", default_value_t = 3)]
    pub el_max_retries: u32,

    /// CL transport retry budget
    #[arg(long, env = "CL_RETRY_DELAY_MS", default_value_t = 1_000)]
    pub cl_retry_delay_ms: u64,
    #[arg(long, env = "CL_RESPONSE_TIMEOUT_MS", default_value_t = 120_000)]
    pub cl_response_timeout_ms: u64,
    #[arg(long, env = "CL_MAX_RETRIES", default_value_t = 3)]
    pub cl_max_retries: u32,

    /// Root contract from which all other addresses are resolved
    #[arg(long, env = "LIDO_LOCATOR_ADDRESS", required = true)]
    pub lido_locator_address: String,

    /// Enables submission when present; emulation-only otherwise
    #[arg(long, env = "TX_SIGNER_PRIVATE_KEY", hide_env_values = true)]
    pub tx_signer_private_key: Option<String>,

    /// Priority fee clamp and source percentile
    #[arg(long, env = "TX_MIN_GAS_PRIORITY_FEE", default_value_t = 50_000_000)]
    pub tx_min_gas_priority_fee: u128,
    #[arg(long, env = "TX_MAX_GAS_PRIORITY_FEE", default_value_t = 10_000_000_000)]
    pub tx_max_gas_priority_fee: u128,
    #[arg(long, env = "TX_GAS_PRIORITY_FEE_PERCENTILE", default_value_t = 25.0)]
    pub tx_gas_priority_fee_percentile: f64,

    /// Gas acceptability window
    #[arg(long, env = "TX_GAS_FEE_HISTORY_DAYS", default_value_t = 1)]
    pub tx_gas_fee_history_days: u64,
    #[arg(long, env = "TX_GAS_FEE_HISTORY_PERCENTILE", default_value_t = 20.0)]
    pub tx_gas_fee_history_percentile: f64,

    /// Hard upper bound on gas per transaction
    #[arg(long, env = "TX_GAS_LIMIT", default_value_t = 10_000_000)]
    pub tx_gas_limit: u64,

    /// Maximum validators per submission
    #[arg(long, env = "VALIDATOR_BATCH_SIZE", default_value_t = 100)]
    pub validator_batch_size: usize,

    /// Additional calldata-size ceiling per transaction
    #[arg(long, env = "MAX_TRANSACTION_SIZE_BYTES", default_value_t = 131_072)]
    pub max_transaction_size_bytes: usize,

    /// Inclusion wait semantics
    #[arg(long, env = "TX_MINING_WAITING_TIMEOUT_MS", default_value_t = 300_000)]
    pub tx_mining_waiting_timeout_ms: u64,
    #[arg(long, env = "TX_CONFIRMATIONS", default_value_t = 1)]
    pub tx_confirmations: u64,

    /// Bootstrap source for the previous root when no persisted value
    /// exists; at most one of root/slot/epoch is honored, in that order
    #[arg(long, env = "START_ROOT")]
    pub start_root: Option<String>,
    #[arg(long, env = "START_SLOT")]
    pub start_slot: Option<u64>,
    #[arg(long, env = "START_EPOCH")]
    pub start_epoch: Option<u64>,
    #[arg(long, env = "START_LOOKBACK_DAYS", default_value_t = 7)]
    pub start_lookback_days: u64,

    /// Sleep between cycles (floored at 10 s)
    #[arg(long, env = "DAEMON_SLEEP_INTERVAL_MS", default_value_t = 300_000)]
    pub daemon_sleep_interval_ms: u64,

    /// Emulate and log without signing, sending, or persisting progress
    #[arg(long, env = "DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Observability endpoint port
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Location of the persisted last-processed root
    #[arg(long, env = "STATE_FILE", default_value = "exit-delay-state.json")]
    pub state_file: PathBuf,
}

impl Args {
    pub fn default_fork(&self) -> Result<ForkName> {
        match ForkName::parse(&self.fork_name) {
            Some(fork) => Ok(fork),
            None => bail!("unsupported fork name {:?}", self.fork_name),
        }
    }

    pub fn beacon_client_config(&self) -> Result<BeaconClientConfig> {
        Ok(BeaconClientConfig {
            endpoints: self.cl_api_urls.clone(),
            max_retries: self.cl_max_retries,
            retry_delay: Duration::from_millis(self.cl_retry_delay_ms),
            response_timeout: Duration::from_millis(self.cl_response_timeout_ms),
            default_fork: self.default_fork()?,
        })
    }

    pub fn gas_config(&self) -> GasConfig {
        GasConfig {
            history_days: self.tx_gas_fee_history_days,
            history_percentile: self.tx_gas_fee_history_percentile,
            priority_fee_percentile: self.tx_gas_priority_fee_percentile,
            min_priority_fee: self.tx_min_gas_priority_fee,
            max_priority_fee: self.tx_max_gas_priority_fee,
            blocks_per_hour: 300,
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            dry_run: self.dry_run,
            gas_limit: self.tx_gas_limit,
            confirmations: self.tx_confirmations,
            mining_timeout: Duration::from_millis(self.tx_mining_waiting_timeout_ms),
            retry_delay: Duration::from_secs(60),
        }
    }

    /// Cycle sleep, floored at 10 seconds.
    pub fn daemon_sleep(&self) -> Duration {
        Duration::from_millis(self.daemon_sleep_interval_ms.max(MIN_DAEMON_SLEEP_MS))
    }

    /// Values scrubbed from log output.
    pub fn secrets(&self) -> Vec<String> {
        self.tx_signer_private_key.iter().cloned().collect()
    }

    pub fn locator_address(&self) -> Result<alloy::primitives::Address> {
        self.lido_locator_address
            .parse()
            .context("invalid lido locator address")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "exit-delay-service",
            "--el-rpc-urls",
            "http://localhost:8545",
            "--cl-api-urls",
            "http://localhost:5052",
            "--lido-locator-address",
            "0xC1d0b3DE6792Bf6b4b37EccdcC24e45dF9cDC2B6",
        ]
    }

    #[test]
    fn parses_minimal_invocation() {
        let args = Args::try_parse_from(base_args()).expect("parse");
        assert_eq!(args.chain_id, 1);
        assert_eq!(args.validator_batch_size, 100);
        assert!(!args.dry_run);
        assert!(args.locator_address().is_ok());
        assert_eq!(args.default_fork().unwrap(), ForkName::Electra);
    }

    #[test]
    fn endpoint_lists_split_on_commas() {
        let mut argv = base_args();
        argv[2] = "http://a:8545,http://b:8545";
        let args = Args::try_parse_from(argv).expect("parse");
        assert_eq!(args.el_rpc_urls.len(), 2);
        assert_eq!(args.el_rpc_urls[1], "http://b:8545");
    }

    #[test]
    fn sleep_interval_is_floored() {
        let mut argv = base_args();
        argv.push("--daemon-sleep-interval-ms");
        argv.push("1000");
        let args = Args::try_parse_from(argv).expect("parse");
        assert_eq!(args.daemon_sleep(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_unknown_fork() {
        let mut argv = base_args();
        argv.push("--fork-name");
        argv.push("bellatrix");
        let args = Args::try_parse_from(argv).expect("parse");
        assert!(args.default_fork().is_err());
    }

    #[test]
    fn secrets_list_tracks_signer_key() {
        let args = Args::try_parse_from(base_args()).expect("parse");
        assert!(args.secrets().is_empty());

        let mut argv = base_args();
        argv.push("--tx-signer-private-key");
        argv.push("deadbeef");
        let args = Args::try_parse_from(argv).expect("parse");
        assert_eq!(args.secrets(), vec!["deadbeef".to_string()]);
    }
}
