//! Mempool Types
//!
//! Purpose:
//!     Raw pending transactions as they come off the feed, the candidate
//!     envelope handed to workers, and the in-flight registry that cancels
//!     candidates whose victim has already been mined.
//!
//! Created: 2026-10-19
//!
//! Dependencies:
//!     - alloy (Address, TxHash, U256, Bytes)
//!     - dashmap (in-flight registry shared by ingest, block watcher, workers)

use alloy::primitives::{Address, Bytes, TxHash, U256};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::types::PendingSwapIntent;

/// A pending transaction as observed on the feed, before decoding.
#[derive(Debug, Clone)]
pub struct RawPendingTx {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
    /// Legacy gas price or EIP-1559 max fee
    pub gas_price: u128,
    /// Signed EIP-2718 encoding, forwarded into bundles
    pub raw: Bytes,
    pub first_seen: Instant,
}

/// Set once the victim is mined or dropped; workers check it between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What the ingestor hands to the worker pool
#[derive(Debug, Clone)]
pub struct Candidate {
    pub intent: Arc<PendingSwapIntent>,
    pub cancel: CancelFlag,
}

/// Victims currently being worked on.
///
/// The block watcher calls `mark_mined` with each block's tx hashes; any
/// match is cancelled so its worker stops at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    pending: Arc<DashMap<TxHash, (Instant, CancelFlag)>>,
    total_tracked: Arc<AtomicU64>,
    total_mined: Arc<AtomicU64>,
    total_lead_time_ms: Arc<AtomicU64>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a victim; returns its cancellation flag
    pub fn track(&self, tx_hash: TxHash) -> CancelFlag {
        self.total_tracked.fetch_add(1, Ordering::Relaxed);
        let flag = CancelFlag::default();
        self.pending.insert(tx_hash, (Instant::now(), flag.clone()));
        flag
    }

    /// Worker finished with the victim (any outcome)
    pub fn release(&self, tx_hash: &TxHash) {
        self.pending.remove(tx_hash);
    }

    /// Cancel every tracked victim included in a mined block.
    /// Returns how many were in flight.
    pub fn mark_mined(&self, mined: &[TxHash]) -> usize {
        let mut hits = 0;
        for hash in mined {
            if let Some((_, (seen_at, flag))) = self.pending.remove(hash) {
                flag.cancel();
                hits += 1;
                self.total_mined.fetch_add(1, Ordering::Relaxed);
                self.total_lead_time_ms
                    .fetch_add(seen_at.elapsed().as_millis() as u64, Ordering::Relaxed);
            }
        }
        hits
    }

    /// Cancel and forget entries older than `max_age` (probably dropped from the mempool)
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, (seen_at, flag)| {
            let keep = seen_at.elapsed() < max_age;
            if !keep {
                flag.cancel();
            }
            keep
        });
        before - self.pending.len()
    }

    pub fn tracking_count(&self) -> usize {
        self.pending.len()
    }

    /// Mean time from first sighting to inclusion, ms
    pub fn mean_lead_time_ms(&self) -> u64 {
        let mined = self.total_mined.load(Ordering::Relaxed);
        if mined == 0 {
            return 0;
        }
        self.total_lead_time_ms.load(Ordering::Relaxed) / mined
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_tracked.load(Ordering::Relaxed),
            self.total_mined.load(Ordering::Relaxed),
        )
    }
}
