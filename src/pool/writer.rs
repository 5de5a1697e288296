//! Pool Writers
//!
//! Purpose:
//! The only path that writes to `PoolStateCache`. One tokio task per
//! pool drains that pool's update channel in order, so writes for a
//! pool are serialized without a global lock.
//!
//! A corrupt update (k drift, zero reserve) triggers a bounded re-fetch
//! of getReserves from the node; the pool stays stale until it succeeds.
//! The same re-fetch runs for every pool after the Sync feed
//! resubscribes, since updates emitted while it was down are gone.
//!
//! Created: 2026-10-19

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::CacheError;
use crate::node::{ChainFeeds, NodeQuery, ReserveUpdate};
use crate::pool::state::PoolStateCache;
use crate::types::PoolId;

const WRITER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub resync_attempts: u32,
    pub resync_backoff: Duration,
    pub rpc_timeout: Duration,
    /// Consecutive unproductive Sync subscriptions before giving up
    pub max_feed_reconnects: u32,
    pub feed_reconnect_delay: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            resync_attempts: 3,
            resync_backoff: Duration::from_millis(250),
            rpc_timeout: Duration::from_secs(2),
            max_feed_reconnects: 50,
            feed_reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// What a pool writer is asked to do
#[derive(Debug, Clone)]
enum WriterCommand {
    Apply(ReserveUpdate),
    /// Re-fetch reserves from the node
    Resync,
}

/// Per-pool writer tasks plus the routing table into them
pub struct PoolWriterSet {
    senders: HashMap<PoolId, mpsc::Sender<WriterCommand>>,
    handles: Vec<JoinHandle<()>>,
    config: WriterConfig,
}

impl PoolWriterSet {
    pub fn spawn(
        cache: PoolStateCache,
        pools: &[PoolId],
        node: Arc<dyn NodeQuery>,
        config: WriterConfig,
    ) -> Self {
        let mut senders = HashMap::with_capacity(pools.len());
        let mut handles = Vec::with_capacity(pools.len());

        for &pool in pools {
            let (tx, rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
            senders.insert(pool, tx);
            handles.push(tokio::spawn(run_writer(
                pool,
                rx,
                cache.clone(),
                Arc::clone(&node),
                config.clone(),
            )));
        }

        info!("Spawned {} pool writers", handles.len());
        Self {
            senders,
            handles,
            config,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Hand an update to its pool's writer. Returns false for untracked pools.
    pub async fn route(&self, update: ReserveUpdate) -> bool {
        match self.senders.get(&update.pool) {
            Some(tx) => tx.send(WriterCommand::Apply(update)).await.is_ok(),
            None => false,
        }
    }

    /// Queue a node re-fetch on every writer, behind any updates already
    /// queued. Returns how many writers accepted it.
    pub async fn resync_all(&self) -> usize {
        let mut queued = 0;
        for tx in self.senders.values() {
            if tx.send(WriterCommand::Resync).await.is_ok() {
                queued += 1;
            }
        }
        queued
    }

    /// Close every channel and wait for writers to drain
    pub async fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn run_writer(
    pool: PoolId,
    mut rx: mpsc::Receiver<WriterCommand>,
    cache: PoolStateCache,
    node: Arc<dyn NodeQuery>,
    config: WriterConfig,
) {
    while let Some(command) = rx.recv().await {
        let update = match command {
            WriterCommand::Apply(update) => update,
            WriterCommand::Resync => {
                resync(pool, &cache, node.as_ref(), &config).await;
                continue;
            }
        };
        match cache.apply(pool, update.reserve0, update.reserve1) {
            Ok(version) => debug!(
                "SYNC {} v{} block {:?}",
                pool, version, update.block
            ),
            Err(CacheError::CorruptFeed { .. }) | Err(CacheError::Stale(_)) => {
                resync(pool, &cache, node.as_ref(), &config).await;
            }
            Err(e) => warn!("Writer for {}: {}", pool, e),
        }
    }
    debug!("Writer for {} stopped", pool);
}

/// Re-fetch authoritative reserves with bounded attempts.
/// Returns true once the cache holds fresh state.
pub async fn resync(
    pool: PoolId,
    cache: &PoolStateCache,
    node: &dyn NodeQuery,
    config: &WriterConfig,
) -> bool {
    for attempt in 1..=config.resync_attempts {
        match tokio::time::timeout(config.rpc_timeout, node.get_reserves(pool)).await {
            Ok(Ok((reserve0, reserve1))) => match cache.reset(pool, reserve0, reserve1) {
                Ok(version) => {
                    info!("RESYNC {} v{} ({} / {})", pool, version, reserve0, reserve1);
                    return cache.get(pool).is_ok();
                }
                Err(e) => {
                    warn!("Resync of {} failed: {}", pool, e);
                    return false;
                }
            },
            Ok(Err(e)) => warn!(
                "Resync {} attempt {}/{}: {}",
                pool, attempt, config.resync_attempts, e
            ),
            Err(_) => warn!(
                "Resync {} attempt {}/{}: timed out",
                pool, attempt, config.resync_attempts
            ),
        }
        tokio::time::sleep(config.resync_backoff * attempt).await;
    }
    error!("Pool {} left stale after {} resync attempts", pool, config.resync_attempts);
    false
}

/// Load every tracked pool from the node before the pipeline starts.
/// Returns the number of pools that came up fresh.
pub async fn initial_sync(cache: &PoolStateCache, node: &dyn NodeQuery, config: &WriterConfig) -> usize {
    let mut fresh = 0;
    for pool in cache.tracked_pools() {
        if resync(pool, cache, node, config).await {
            fresh += 1;
        }
    }
    info!("Initial sync: {}/{} pools fresh", fresh, cache.tracked_pools().len());
    fresh
}

/// Subscribe to Sync events for all pools and route them to their writers.
///
/// Every resubscription is followed by a resync of all pools. The reconnect
/// budget counts consecutive subscriptions that delivered nothing; returns
/// Err once it is spent.
pub async fn run_sync_feed(
    feeds: Arc<dyn ChainFeeds>,
    writers: Arc<PoolWriterSet>,
    pools: Vec<PoolId>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let max_reconnects = writers.config().max_feed_reconnects;
    let delay = writers.config().feed_reconnect_delay;
    let mut reconnects = 0u32;
    let mut subscribed_before = false;
    loop {
        let reason = match feeds.reserve_syncs(pools.clone()).await {
            Ok(mut stream) => {
                info!("Sync feed subscribed for {} pools", pools.len());
                if subscribed_before {
                    let queued = writers.resync_all().await;
                    info!("Sync feed resubscribed: resync queued for {} pools", queued);
                }
                subscribed_before = true;

                let mut delivered = false;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        next = stream.next() => match next {
                            Some(update) => {
                                delivered = true;
                                let pool = update.pool;
                                if !writers.route(update).await {
                                    debug!("Sync for untracked pool {}", pool);
                                }
                            }
                            None => break,
                        },
                    }
                }
                if delivered {
                    reconnects = 0;
                }
                "stream ended".to_string()
            }
            Err(e) => e.to_string(),
        };

        reconnects += 1;
        if reconnects > max_reconnects {
            anyhow::bail!("Sync feed: {} reconnects exhausted: {}", max_reconnects, reason);
        }
        warn!("Sync feed lost (reconnect {}/{}): {}", reconnects, max_reconnects, reason);
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mempool::types::RawPendingTx;
    use crate::node::{MinedBlock, ProbeOutcome, ProbeRequest, ReceiptStatus};
    use crate::pool::registry::TrackedPool;
    use crate::types::PoolKind;
    use alloy::primitives::{Address, Bytes, TxHash, U256};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedReserves {
        reserves: (U256, U256),
        calls: AtomicU32,
    }

    #[async_trait]
    impl NodeQuery for FixedReserves {
        async fn block_number(&self) -> Result<u64> {
            Ok(1)
        }
        async fn get_reserves(&self, _pool: PoolId) -> Result<(U256, U256)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reserves)
        }
        async fn get_code(&self, _address: Address) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn receipt_status(&self, _tx: TxHash) -> Result<Option<ReceiptStatus>> {
            Ok(None)
        }
        async fn probe_round_trip(&self, _request: &ProbeRequest) -> Result<ProbeOutcome> {
            anyhow::bail!("unused")
        }
    }

    fn setup() -> (PoolStateCache, PoolId) {
        let cache = PoolStateCache::new(500);
        let pool = TrackedPool {
            address: Address::repeat_byte(0xaa),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            dex: "uniswapv2".into(),
            kind: PoolKind::ConstantProduct,
            fee_bps: 30,
        };
        cache.track(&pool);
        (cache, pool.address)
    }

    #[tokio::test]
    async fn test_initial_sync_loads_reserves() {
        let (cache, pool) = setup();
        let node = FixedReserves {
            reserves: (U256::from(1_000), U256::from(2_000)),
            calls: AtomicU32::new(0),
        };
        let fresh = initial_sync(&cache, &node, &WriterConfig::default()).await;
        assert_eq!(fresh, 1);
        assert_eq!(cache.get(pool).unwrap().reserve1, U256::from(2_000));
    }

    #[tokio::test]
    async fn test_corrupt_update_triggers_resync() {
        let (cache, pool) = setup();
        cache.reset(pool, U256::from(1_000_000), U256::from(1_000_000)).unwrap();

        let node = Arc::new(FixedReserves {
            reserves: (U256::from(1_000_500), U256::from(999_500)),
            calls: AtomicU32::new(0),
        });
        let writers = PoolWriterSet::spawn(
            cache.clone(),
            &[pool],
            node.clone() as Arc<dyn NodeQuery>,
            WriterConfig::default(),
        );

        // k jumps 100x: corrupt
        assert!(
            writers
                .route(ReserveUpdate {
                    pool,
                    reserve0: U256::from(10_000_000),
                    reserve1: U256::from(10_000_000),
                    block: Some(5),
                })
                .await
        );
        writers.shutdown().await;

        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
        let snap = cache.get(pool).unwrap();
        assert_eq!(snap.reserve0, U256::from(1_000_500));
        // reset, corrupt mark, resync reset
        assert_eq!(snap.version, 3);
    }

    #[tokio::test]
    async fn test_route_unknown_pool() {
        let (cache, pool) = setup();
        let node: Arc<dyn NodeQuery> = Arc::new(FixedReserves {
            reserves: (U256::from(1), U256::from(1)),
            calls: AtomicU32::new(0),
        });
        let writers = PoolWriterSet::spawn(cache, &[pool], node, WriterConfig::default());
        let routed = writers
            .route(ReserveUpdate {
                pool: Address::repeat_byte(0xff),
                reserve0: U256::from(1),
                reserve1: U256::from(1),
                block: None,
            })
            .await;
        assert!(!routed);
        writers.shutdown().await;
    }

    /// The first `ending_sessions` Sync subscriptions deliver one update and
    /// end; later ones stay open without traffic
    struct SyncFeed {
        update: ReserveUpdate,
        ending_sessions: u32,
        subscriptions: AtomicU32,
    }

    #[async_trait]
    impl ChainFeeds for SyncFeed {
        async fn pending_transactions(&self) -> Result<BoxStream<'static, RawPendingTx>> {
            Ok(stream::empty().boxed())
        }
        async fn reserve_syncs(&self, _pools: Vec<PoolId>) -> Result<BoxStream<'static, ReserveUpdate>> {
            let n = self.subscriptions.fetch_add(1, Ordering::SeqCst);
            if n >= self.ending_sessions {
                return Ok(stream::pending().boxed());
            }
            Ok(stream::iter(vec![self.update.clone()]).boxed())
        }
        async fn mined_blocks(&self) -> Result<BoxStream<'static, MinedBlock>> {
            Ok(stream::empty().boxed())
        }
    }

    fn fast_feed_config(max_feed_reconnects: u32) -> WriterConfig {
        WriterConfig {
            resync_backoff: Duration::from_millis(1),
            max_feed_reconnects,
            feed_reconnect_delay: Duration::from_millis(1),
            ..WriterConfig::default()
        }
    }

    async fn wait_for(counter: &AtomicU32, at_least: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < at_least {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_resubscribe_resyncs_every_pool() {
        let (cache, pool) = setup();
        cache.reset(pool, U256::from(1_000_000), U256::from(1_000_000)).unwrap();
        let node = Arc::new(FixedReserves {
            reserves: (U256::from(1_000_500), U256::from(999_500)),
            calls: AtomicU32::new(0),
        });
        let feed = Arc::new(SyncFeed {
            update: ReserveUpdate {
                pool,
                reserve0: U256::from(1_000_100),
                reserve1: U256::from(999_900),
                block: Some(5),
            },
            ending_sessions: 1,
            subscriptions: AtomicU32::new(0),
        });
        let writers = Arc::new(PoolWriterSet::spawn(
            cache.clone(),
            &[pool],
            node.clone() as Arc<dyn NodeQuery>,
            fast_feed_config(3),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_sync_feed(feed.clone(), writers.clone(), vec![pool], stop_rx));
        // reserves moved while the feed was down: only the node knows
        wait_for(&node.calls, 1).await;
        let _ = stop_tx.send(true);
        assert!(task.await.unwrap().is_ok());
        let Ok(writers) = Arc::try_unwrap(writers) else {
            panic!("writers still shared after the feed stopped");
        };
        writers.shutdown().await;

        assert_eq!(feed.subscriptions.load(Ordering::SeqCst), 2);
        // the first subscription does not resync
        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(pool).unwrap().reserve0, U256::from(1_000_500));
    }

    #[tokio::test]
    async fn test_sync_feed_survives_healthy_reconnects() {
        let (cache, pool) = setup();
        cache.reset(pool, U256::from(1_000_000), U256::from(1_000_000)).unwrap();
        let node = Arc::new(FixedReserves {
            reserves: (U256::from(1_000_000), U256::from(1_000_000)),
            calls: AtomicU32::new(0),
        });
        let feed = Arc::new(SyncFeed {
            update: ReserveUpdate {
                pool,
                reserve0: U256::from(1_000_000),
                reserve1: U256::from(1_000_000),
                block: None,
            },
            ending_sessions: u32::MAX,
            subscriptions: AtomicU32::new(0),
        });
        let writers = Arc::new(PoolWriterSet::spawn(
            cache,
            &[pool],
            node as Arc<dyn NodeQuery>,
            fast_feed_config(3),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_sync_feed(feed.clone(), writers, vec![pool], stop_rx));
        wait_for(&feed.subscriptions, 10).await;
        assert!(!task.is_finished());

        let _ = stop_tx.send(true);
        assert!(task.await.unwrap().is_ok());
    }

    /// Sync subscription always fails
    struct DeadSyncFeed {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl ChainFeeds for DeadSyncFeed {
        async fn pending_transactions(&self) -> Result<BoxStream<'static, RawPendingTx>> {
            Ok(stream::empty().boxed())
        }
        async fn reserve_syncs(&self, _pools: Vec<PoolId>) -> Result<BoxStream<'static, ReserveUpdate>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection refused")
        }
        async fn mined_blocks(&self) -> Result<BoxStream<'static, MinedBlock>> {
            Ok(stream::empty().boxed())
        }
    }

    #[tokio::test]
    async fn test_sync_feed_gives_up_without_traffic() {
        let (cache, pool) = setup();
        let node: Arc<dyn NodeQuery> = Arc::new(FixedReserves {
            reserves: (U256::from(1), U256::from(1)),
            calls: AtomicU32::new(0),
        });
        let feed = Arc::new(DeadSyncFeed {
            attempts: AtomicU32::new(0),
        });
        let writers = Arc::new(PoolWriterSet::spawn(cache, &[pool], node, fast_feed_config(2)));
        let (_stop_tx, stop_rx) = watch::channel(false);

        let result = run_sync_feed(feed.clone(), writers, vec![pool], stop_rx).await;
        assert!(result.is_err());
        assert_eq!(feed.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sync_feed_backoff_observes_shutdown() {
        let (cache, pool) = setup();
        let node: Arc<dyn NodeQuery> = Arc::new(FixedReserves {
            reserves: (U256::from(1), U256::from(1)),
            calls: AtomicU32::new(0),
        });
        let mut config = fast_feed_config(3);
        config.feed_reconnect_delay = Duration::from_secs(60);
        let writers = Arc::new(PoolWriterSet::spawn(cache, &[pool], node, config));
        let feed = Arc::new(DeadSyncFeed {
            attempts: AtomicU32::new(0),
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(run_sync_feed(feed.clone(), writers, vec![pool], stop_rx));
        wait_for(&feed.attempts, 1).await;
        let _ = stop_tx.send(true);
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap();
        assert!(result.unwrap().is_ok());
    }
}
