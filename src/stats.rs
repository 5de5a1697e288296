//! Engine counters
//!
//! Lock-free counters bumped from every stage, summarized periodically as
//! one `ENGINE STATS` log line.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ExecutionOutcome;

#[derive(Debug, Default)]
pub struct EngineStats {
    pub seen: AtomicU64,
    pub decoded: AtomicU64,
    pub undecoded: AtomicU64,
    pub shed: AtomicU64,
    pub expired: AtomicU64,
    pub cancelled: AtomicU64,
    pub evaluated: AtomicU64,
    pub opportunities: AtomicU64,
    pub screened_out: AtomicU64,
    pub dispatched: AtomicU64,
    pub sim_reverts: AtomicU64,
    pub submitted: AtomicU64,
    pub included: AtomicU64,
    pub not_included: AtomicU64,
    pub reverted: AtomicU64,
    pub faults: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Included { .. } => Self::bump(&self.included),
            ExecutionOutcome::NotIncluded => Self::bump(&self.not_included),
            ExecutionOutcome::Reverted(_) => Self::bump(&self.reverted),
            ExecutionOutcome::Expired => Self::bump(&self.expired),
            ExecutionOutcome::DryRun => {}
        }
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// One-line summary for the periodic stats log
    pub fn summary(&self, in_flight: usize) -> String {
        format!(
            "ENGINE STATS | seen={} decoded={} undecoded={} | shed={} expired={} cancelled={} | \
             evaluated={} opportunities={} screened_out={} | dispatched={} sim_reverts={} submitted={} | \
             included={} not_included={} reverted={} | faults={} | in_flight={}",
            Self::get(&self.seen),
            Self::get(&self.decoded),
            Self::get(&self.undecoded),
            Self::get(&self.shed),
            Self::get(&self.expired),
            Self::get(&self.cancelled),
            Self::get(&self.evaluated),
            Self::get(&self.opportunities),
            Self::get(&self.screened_out),
            Self::get(&self.dispatched),
            Self::get(&self.sim_reverts),
            Self::get(&self.submitted),
            Self::get(&self.included),
            Self::get(&self.not_included),
            Self::get(&self.reverted),
            Self::get(&self.faults),
            in_flight,
        )
    }
}
