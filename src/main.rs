//! Sandwich Engine
//!
//! Main entry point. Wires the stages together and runs until a signal or
//! a fatal feed error:
//!
//!   mempool feed ──► decode ──► bounded queue ──► worker pool
//!                                                  │ evaluate
//!                                                  │ screen
//!                                                  ▼
//!                                        execution coordinator
//!                                  build ─► simulate ─► submit ─► poll
//!
//! Background tasks: pool writers fed by Sync logs, the mined-block
//! watcher (cancels in-flight victims), and a periodic stats/cleanup tick.
//!
//! Created: 2026-10-19

use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sando_engine::config::EngineConfig;
use sando_engine::mempool::{run_block_watcher, InFlightRegistry, MempoolIngestor, SwapDecoder};
use sando_engine::node::{AlloyNode, ChainFeeds, NodeQuery};
use sando_engine::pipeline::CandidatePipeline;
use sando_engine::pool::writer::{initial_sync, run_sync_feed};
use sando_engine::pool::{PoolStateCache, PoolWriterSet};
use sando_engine::relay::HttpRelay;
use sando_engine::safety::{SafetyScreener, TokenLists};
use sando_engine::sandwich::{
    BundleBuilder, ExecutionCoordinator, LocalBundleSigner, OpportunityEvaluator,
};
use sando_engine::stats::EngineStats;
use sando_engine::types::PoolKind;

/// Mempool sandwich decision engine
#[derive(Parser)]
#[command(name = "sando-engine")]
struct Args {
    /// Engine config file
    #[arg(short, long, env = "SANDO_CONFIG", default_value = "config/engine.toml")]
    config: PathBuf,

    /// Build and simulate bundles but never submit
    #[arg(long)]
    dry_run: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = EngineConfig::load(&args.config, args.dry_run)?;
    info!(
        "Sandwich engine starting | config {} | chain {} | {} pools | {} routers | dry_run={}",
        args.config.display(),
        config.node.chain_id,
        config.pools.len(),
        config.routers.len(),
        config.execution.dry_run
    );

    // Node
    let node = Arc::new(
        AlloyNode::connect(
            &config.node.ws_url,
            config.node.probe_contract,
            config.node.probe_caller,
        )
        .await?,
    );
    let query: Arc<dyn NodeQuery> = node.clone();
    let feeds: Arc<dyn ChainFeeds> = node.clone();

    // Pool state: only constant-product pools are held and synced
    let registry = Arc::new(config.registry());
    let cache = PoolStateCache::new(config.ingest.max_k_drift_bps);
    for pool in registry.pools().filter(|p| p.kind == PoolKind::ConstantProduct) {
        cache.track(pool);
    }
    let writer_config = config.writer_config();
    if initial_sync(&cache, query.as_ref(), &writer_config).await == 0 {
        return Err(anyhow!("no tracked pool could be loaded from the node"));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let synced = registry.constant_product_ids();
    let writers = Arc::new(PoolWriterSet::spawn(
        cache.clone(),
        &synced,
        query.clone(),
        writer_config,
    ));
    let sync_task = tokio::spawn(run_sync_feed(
        feeds.clone(),
        writers.clone(),
        synced,
        shutdown_rx.clone(),
    ));

    // Decision stages
    let stats = Arc::new(EngineStats::new());
    let inflight = InFlightRegistry::new();
    let lists = match &config.screening.token_lists {
        Some(path) => TokenLists::load(path)?,
        None => {
            warn!("No token lists configured: every token goes through the full screen");
            TokenLists::default()
        }
    };
    let evaluator = Arc::new(OpportunityEvaluator::new(cache.clone(), config.evaluator_config()?));
    let screener = Arc::new(SafetyScreener::new(
        lists,
        query.clone(),
        cache.clone(),
        config.screener_config()?,
    ));

    // Execution
    let searcher = match &config.execution.searcher_private_key {
        Some(key) => key
            .parse::<PrivateKeySigner>()
            .context("SEARCHER_PRIVATE_KEY is not a valid private key")?,
        None => {
            info!("No searcher key: dry run signs with an ephemeral key");
            PrivateKeySigner::random()
        }
    };
    info!("Searcher address: {}", searcher.address());
    let nonce_provider = match &config.node.http_url {
        Some(url) => ProviderBuilder::new()
            .connect_http(url.parse().context("node.http_url is not a valid URL")?)
            .erased(),
        None => node.provider().clone(),
    };
    let signer = Arc::new(LocalBundleSigner::new(nonce_provider, searcher, config.signer_config()));
    let relay_auth = config
        .execution
        .relay_auth_key
        .as_deref()
        .map(str::parse::<PrivateKeySigner>)
        .transpose()
        .context("RELAY_AUTH_KEY is not a valid private key")?;
    let relay = Arc::new(HttpRelay::new(config.relay_config(), relay_auth)?);

    let coordinator = Arc::new(ExecutionCoordinator::new(
        evaluator.clone(),
        cache.clone(),
        BundleBuilder::new(signer, config.execution.target_blocks),
        relay,
        query.clone(),
        config.cooldown(),
        stats.clone(),
        config.coordinator_config(),
    ));
    let pipeline = Arc::new(CandidatePipeline::new(
        evaluator,
        screener.clone(),
        coordinator.clone(),
        inflight.clone(),
        stats.clone(),
        config.horizon(),
    ));

    // Runtime tasks
    let (work_tx, work_rx) = mpsc::channel(config.ingest.channel_capacity.max(1));
    let workers = tokio::spawn(pipeline.run_workers(work_rx, config.ingest.workers));

    let watcher = tokio::spawn(run_block_watcher(
        feeds.clone(),
        inflight.clone(),
        config.ingest_config(),
        shutdown_rx.clone(),
    ));

    let ticker = tokio::spawn(stats_ticker(
        Duration::from_secs(config.ingest.stats_interval_secs.max(1)),
        stats.clone(),
        inflight.clone(),
        screener,
        coordinator,
        cache,
        query,
        shutdown_rx.clone(),
    ));

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signal_handle = signals.handle();
    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Some(sig) = signals.next().await {
            info!("Signal {} received, shutting down", sig);
            let _ = signal_shutdown.send(true);
        }
    });

    // Runs until shutdown or a fatal feed error; dropping work_tx drains the workers
    let ingestor = MempoolIngestor::new(
        feeds,
        SwapDecoder::new(registry, config.ingest.max_hops),
        inflight,
        stats.clone(),
        config.ingest_config(),
    );
    let result = ingestor.run(work_tx, shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    signal_handle.close();
    if let Err(e) = workers.await {
        warn!("Worker pool task failed: {}", e);
    }
    for (name, task) in [("block watcher", watcher), ("sync feed", sync_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("{} ended with error: {}", name, e),
            Err(e) => warn!("{} task failed: {}", name, e),
        }
    }
    let _ = ticker.await;
    match Arc::try_unwrap(writers) {
        Ok(writers) => writers.shutdown().await,
        Err(_) => warn!("Pool writers still referenced at shutdown"),
    }

    info!("Final {}", stats.summary(0));
    match result {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("FATAL: {}", e);
            Err(anyhow!(e))
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

/// Periodic stats line plus verdict-cache and cooldown housekeeping
#[allow(clippy::too_many_arguments)]
async fn stats_ticker(
    every: Duration,
    stats: Arc<EngineStats>,
    inflight: InFlightRegistry,
    screener: Arc<SafetyScreener>,
    coordinator: Arc<ExecutionCoordinator>,
    cache: PoolStateCache,
    node: Arc<dyn NodeQuery>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = interval.tick() => {}
        }

        info!("{}", stats.summary(inflight.tracking_count()));

        let pruned = screener.prune();
        let (tracked, stale) = cache.stats();
        let (cooling, suspended) = coordinator.cooldown_counts().await;
        match node.block_number().await {
            Ok(block) => {
                coordinator.cleanup_cooldowns(block).await;
            }
            Err(e) => warn!("Stats tick: block number unavailable: {}", e),
        }
        let (tracked_victims, mined) = inflight.totals();
        info!(
            "HOUSEKEEPING | pools {}/{} stale | verdicts {} (-{}) | cooldown {} suspended {} | \
             victims mined {}/{} lead {}ms",
            stale,
            tracked,
            screener.cached_count(),
            pruned,
            cooling,
            suspended,
            mined,
            tracked_victims,
            inflight.mean_lead_time_ms()
        );
    }
}
