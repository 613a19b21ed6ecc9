//! Exit-Delay Prover Service
//!
//! Daemon that watches the exit-request oracle, detects validators past
//! their exit deadline, and submits Merkle-proof witnesses to the
//! on-chain exit-delay verifier.

mod api;
mod config;
mod contracts;
mod daemon;
mod deadlines;
mod decoder;
mod errors;
mod executor;
mod gas;
mod prover;
mod roots;
mod state;
mod store;

use crate::config::Args;
use crate::contracts::Contracts;
use crate::daemon::CycleDriver;
use crate::deadlines::BeaconConfig;
use crate::errors::ErrorReporter;
use crate::executor::TransactionExecutor;
use crate::gas::GasManager;
use crate::prover::{BatchLimits, ProverCore};
use crate::roots::{Bootstrap, RootProvider};
use crate::state::AppState;
use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::layers::RetryBackoffLayer;
use anyhow::{bail, Context, Result};
use clap::Parser;
use proof_gen::BeaconClient;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    info!(
        chain_id = args.chain_id,
        dry_run = args.dry_run,
        "starting exit-delay service"
    );

    let cl = BeaconClient::new(args.beacon_client_config()?)?;

    let signer: Option<PrivateKeySigner> = match &args.tx_signer_private_key {
        Some(key) => {
            let stripped = key.strip_prefix("0x").unwrap_or(key);
            Some(stripped.parse().context("invalid transaction signer key")?)
        }
        None => None,
    };

    let el_url: reqwest::Url = args
        .el_rpc_urls
        .first()
        .context("no execution endpoints configured")?
        .parse()
        .context("invalid execution endpoint url")?;
    let rpc = RpcClient::builder()
        .layer(RetryBackoffLayer::new(
            args.el_max_retries,
            args.el_retry_delay_ms,
            330,
        ))
        .http(el_url);
    let provider: DynProvider = match &signer {
        Some(signer) => ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_client(rpc)
            .erased(),
        None => ProviderBuilder::new().connect_client(rpc).erased(),
    };

    let chain_id = provider.get_chain_id().await.context("reading chain id")?;
    if chain_id != args.chain_id {
        bail!(
            "execution chain id {chain_id} does not match configured {}",
            args.chain_id
        );
    }

    match &signer {
        Some(signer) => info!(address = %signer.address(), "transaction signer configured"),
        None => info!("no signer configured, running emulation-only"),
    }

    let contracts = Contracts::resolve(provider.clone(), args.locator_address()?).await?;

    let genesis = cl.get_genesis().await.context("fetching genesis")?;
    let spec = cl.get_spec().await.context("fetching chain spec")?;
    let shard_committee_period_seconds = contracts.shard_committee_period_seconds().await?;
    let beacon_config = BeaconConfig {
        genesis_time: genesis.genesis_time,
        seconds_per_slot: spec.seconds_per_slot,
        slots_per_epoch: spec.slots_per_epoch,
        slots_per_historical_root: spec.slots_per_historical_root,
        capella_fork_epoch: spec.capella_fork_epoch,
        shard_committee_period_seconds,
    };
    info!(?beacon_config, "chain constants initialized");

    let app = AppState::new(3 * args.daemon_sleep());
    let api_handle = tokio::spawn(api::run_server(args.http_port, app.clone()));

    let gas = GasManager::new(provider.clone(), args.gas_config());
    let executor = TransactionExecutor::new(
        provider.clone(),
        signer.as_ref().map(PrivateKeySigner::address),
        args.executor_config(),
    );
    let prover = ProverCore::new(
        cl.clone(),
        contracts,
        executor,
        gas,
        beacon_config,
        BatchLimits {
            validators_per_tx: args.validator_batch_size,
            max_tx_size_bytes: args.max_transaction_size_bytes,
        },
        app.clone(),
    );

    let bootstrap =
        Bootstrap::from_options(args.start_root.as_deref(), args.start_slot, args.start_epoch)?;
    let roots = RootProvider::load(
        cl.clone(),
        beacon_config,
        bootstrap,
        args.start_lookback_days,
        args.state_file.clone(),
    );
    let reporter = ErrorReporter::new(args.secrets());

    let mut driver = CycleDriver::new(
        cl,
        provider,
        prover,
        roots,
        reporter,
        app,
        args.daemon_sleep(),
        args.dry_run,
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = driver.run() => {
            if let Err(e) = result {
                error!(error = %e, "daemon terminated");
            }
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => error!(error = %e, "status endpoint failed"),
                Err(e) => error!(error = %e, "status endpoint task panicked"),
                Ok(Ok(())) => {}
            }
        }
    }

    Ok(())
}
