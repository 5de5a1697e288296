//! Mempool Ingestor
//!
//! Purpose:
//!     Subscribe to pending transactions, decode them, and push candidates
//!     onto the bounded work channel. A companion block watcher cancels
//!     candidates whose victim has been mined.
//!
//! Created: 2026-10-19
//!
//! Backpressure:
//!     The work channel is bounded. When it is full the newest candidate is
//!     dropped (counted as shed); the ingestor never blocks on workers.
//!     Workers separately drop candidates older than the horizon.
//!
//! Connection handling:
//!     A feed that ends or stays silent past the heartbeat is resubscribed
//!     with linear backoff. When the reconnect budget is spent the ingestor
//!     returns `PipelineError::FeedDisconnected`, which is fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, trace, warn};

use super::decoder::SwapDecoder;
use super::types::{Candidate, InFlightRegistry, RawPendingTx};
use crate::error::{DecodeError, PipelineError};
use crate::node::ChainFeeds;
use crate::stats::EngineStats;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// No pending tx for this long means the subscription is dead
    pub heartbeat: Duration,
    pub max_reconnects: u32,
    pub reconnect_delay: Duration,
    /// In-flight entries older than this are presumed dropped from the mempool
    pub horizon: Duration,
}

/// What happened to one pending transaction
#[derive(Debug)]
pub enum IngestOutcome {
    Queued,
    Undecoded(DecodeError),
    Shed,
    ChannelClosed,
}

enum SessionEnd {
    Shutdown,
    Lost(String),
}

pub struct MempoolIngestor {
    feeds: Arc<dyn ChainFeeds>,
    decoder: SwapDecoder,
    inflight: InFlightRegistry,
    stats: Arc<EngineStats>,
    config: IngestConfig,
}

impl MempoolIngestor {
    pub fn new(
        feeds: Arc<dyn ChainFeeds>,
        decoder: SwapDecoder,
        inflight: InFlightRegistry,
        stats: Arc<EngineStats>,
        config: IngestConfig,
    ) -> Self {
        Self {
            feeds,
            decoder,
            inflight,
            stats,
            config,
        }
    }

    /// Runs until shutdown (Ok) or until the feed is lost for good (Err).
    pub async fn run(
        &self,
        work_tx: mpsc::Sender<Candidate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        let mut reconnects = 0u32;

        loop {
            let reason = match self.feeds.pending_transactions().await {
                Ok(stream) => {
                    info!("Mempool: pending tx subscription active");
                    let seen_before = EngineStats::get(&self.stats.seen);
                    match self.run_session(stream, &work_tx, &mut shutdown).await {
                        SessionEnd::Shutdown => return Ok(()),
                        SessionEnd::Lost(reason) => {
                            // a session that delivered traffic earns a fresh budget
                            if EngineStats::get(&self.stats.seen) > seen_before {
                                reconnects = 0;
                            }
                            reason
                        }
                    }
                }
                Err(e) => e.to_string(),
            };

            reconnects += 1;
            if reconnects > self.config.max_reconnects {
                error!(
                    "Mempool: {} reconnects exhausted, giving up: {}",
                    self.config.max_reconnects, reason
                );
                return Err(PipelineError::FeedDisconnected(reason));
            }

            let delay = (self.config.reconnect_delay * reconnects).min(MAX_RECONNECT_DELAY);
            warn!(
                "Mempool feed lost (reconnect {}/{}): {}, retrying in {:?}",
                reconnects, self.config.max_reconnects, reason, delay
            );
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_session(
        &self,
        stream: futures::stream::BoxStream<'static, RawPendingTx>,
        work_tx: &mpsc::Sender<Candidate>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let stream = stream.timeout(self.config.heartbeat);
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return SessionEnd::Shutdown,
                next = stream.next() => match next {
                    Some(Ok(raw)) => {
                        if let IngestOutcome::ChannelClosed = self.ingest(&raw, work_tx) {
                            return SessionEnd::Shutdown;
                        }
                    }
                    Some(Err(_)) => {
                        return SessionEnd::Lost(format!(
                            "no pending tx for {:?}",
                            self.config.heartbeat
                        ));
                    }
                    None => return SessionEnd::Lost("pending stream ended".to_string()),
                },
            }
        }
    }

    /// Decode one pending transaction and try to enqueue it. Never blocks.
    pub fn ingest(&self, raw: &RawPendingTx, work_tx: &mpsc::Sender<Candidate>) -> IngestOutcome {
        EngineStats::bump(&self.stats.seen);

        let intent = match self.decoder.decode(raw) {
            Ok(intent) => intent,
            Err(e) => {
                EngineStats::bump(&self.stats.undecoded);
                trace!("UNDECODED {}: {}", raw.hash, e);
                return IngestOutcome::Undecoded(e);
            }
        };
        EngineStats::bump(&self.stats.decoded);
        debug!(
            "PENDING: {} | {} | {} -> {} | amt={} min_out={} | gas={:.1}gwei",
            intent.tx_hash,
            intent.function_name,
            intent.token_in,
            intent.token_out,
            intent.amount_in,
            intent.min_amount_out,
            intent.gas_price as f64 / 1e9,
        );

        let tx_hash = intent.tx_hash;
        let cancel = self.inflight.track(tx_hash);
        let candidate = Candidate {
            intent: Arc::new(intent),
            cancel,
        };

        match work_tx.try_send(candidate) {
            Ok(()) => IngestOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.inflight.release(&tx_hash);
                EngineStats::bump(&self.stats.shed);
                debug!("SHED {}: work queue full", tx_hash);
                IngestOutcome::Shed
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.inflight.release(&tx_hash);
                IngestOutcome::ChannelClosed
            }
        }
    }
}

/// Cancel in-flight candidates as their victims land on chain.
/// Reconnects with a bounded budget; losing this feed is not fatal to the
/// engine (candidates still expire by age), so the caller only logs the Err.
pub async fn run_block_watcher(
    feeds: Arc<dyn ChainFeeds>,
    inflight: InFlightRegistry,
    config: IngestConfig,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut reconnects = 0u32;
    loop {
        let reason = match feeds.mined_blocks().await {
            Ok(mut blocks) => {
                let mut delivered = false;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        next = blocks.next() => match next {
                            Some(block) => {
                                delivered = true;
                                let hits = inflight.mark_mined(&block.tx_hashes);
                                let expired = inflight.cleanup(config.horizon);
                                if hits > 0 || expired > 0 {
                                    debug!(
                                        "BLOCK {} | cancelled {} mined, {} expired | tracking={}",
                                        block.number, hits, expired, inflight.tracking_count()
                                    );
                                }
                            }
                            None => break,
                        },
                    }
                }
                if delivered {
                    reconnects = 0;
                }
                "block stream ended".to_string()
            }
            Err(e) => e.to_string(),
        };

        reconnects += 1;
        if reconnects > config.max_reconnects {
            anyhow::bail!("block feed: {} reconnects exhausted: {}", config.max_reconnects, reason);
        }
        let delay = (config.reconnect_delay * reconnects).min(MAX_RECONNECT_DELAY);
        warn!(
            "Block feed lost (reconnect {}/{}): {}, retrying in {:?}",
            reconnects, config.max_reconnects, reason, delay
        );
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
