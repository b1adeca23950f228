use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use condense_miner::cli;
use condense_miner::ledger::SidecarLedger;
use condense_miner::processor::WordRankCompressor;
use condense_miner::service::{self, MinerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args and env vars
    let args = cli::Cli::parse();
    let log_json = args.log_json;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "condense_miner=debug,tower_http=debug".into()),
        )
        .with(log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let settings = args.into_settings()?;
    let ledger = Arc::new(SidecarLedger::new(&settings.ledger)?);
    let store = service::build_store(&settings).await?;
    let miner = MinerService::new(settings, ledger, store, Arc::new(WordRankCompressor));

    info!(
        "Starting {} {} on {}:{}",
        cli::APP_NAME,
        cli::APP_VERSION,
        miner.settings().listen_address,
        miner.settings().axon_port
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };
    if let Err(e) = miner.run_until(shutdown).await {
        error!("Miner stopped with error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
