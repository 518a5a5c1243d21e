//! Token Pulse - holder/supply growth poller
//!
//! Every poll interval: discover token contracts, fetch their current
//! count, compare with the stored one and signal on growth at or above
//! the configured threshold.

use token_pulse::core::{
    BlockScanDiscovery, CountFetcher, Discovery, HolderCountFetcher, ListingDiscovery,
    PollScheduler, SupplyFetcher,
};
use token_pulse::models::{CountSource, DiscoveryMode, PulseConfig, StoreBackend};
use token_pulse::providers::{ExplorerClient, RpcProvider};
use token_pulse::store::{MemoryRegistry, SqliteRegistry, TokenRegistry};
use token_pulse::utils::{APP_NAME, APP_VERSION};

use eyre::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    info!("🫀 {} v{} starting", APP_NAME, APP_VERSION);

    let config = match PulseConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Invalid configuration: {}", e);
            return Err(e.into());
        }
    };
    config.log_summary();

    let explorer = ExplorerClient::new(
        config.explorer_url.clone(),
        config.explorer_api_key.clone(),
        config.call_timeout,
    )?;
    let rpc = RpcProvider::new(
        config.rpc_url.clone(),
        config.rpc_fallback_url.clone(),
        config.call_timeout,
    )?;
    info!("🔌 RPC: {}", rpc.masked_url());

    let discovery: Arc<dyn Discovery> = match config.discovery {
        DiscoveryMode::Listing => Arc::new(ListingDiscovery::new(explorer.clone())),
        DiscoveryMode::BlockScan => {
            Arc::new(BlockScanDiscovery::new(rpc.clone(), config.max_blocks_per_scan))
        }
    };

    let fetcher: Arc<dyn CountFetcher> = match config.count_source {
        CountSource::Holders => Arc::new(HolderCountFetcher::new(explorer.clone())),
        CountSource::TotalSupply => {
            let supply = SupplyFetcher::new(rpc.clone());
            if config.verify_abi {
                Arc::new(supply.with_abi_check(explorer.clone()))
            } else {
                Arc::new(supply)
            }
        }
    };

    let registry: Arc<dyn TokenRegistry> = match config.store {
        StoreBackend::Sqlite { ref path } => Arc::new(SqliteRegistry::open(path)?),
        StoreBackend::Memory => Arc::new(MemoryRegistry::new()),
    };
    info!("💾 Tracking {} tokens", registry.len().await?);

    let scheduler = Arc::new(PollScheduler::new(&config, discovery, fetcher, registry));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    wait_for_shutdown().await;
    info!("🛑 Shutting down gracefully, finishing current cycle...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = runner.await {
        error!("❌ Scheduler task failed: {}", e);
    }

    // Print final statistics
    let stats = scheduler.stats();
    println!("\n📊 Final Statistics:");
    println!("   Cycles Run:      {}", stats.cycles_run);
    println!("   Cycles Skipped:  {}", stats.cycles_skipped);
    println!("   Cycles Failed:   {}", stats.cycles_failed);
    println!("   Tokens Seeded:   {}", stats.tokens_seeded);
    println!("   Tokens Updated:  {}", stats.tokens_updated);
    println!("   Signals:         {}", stats.signals);
    println!("   Fetch Failures:  {}", stats.fetch_failures);

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            error!("❌ Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
