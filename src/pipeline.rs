//! Candidate Worker Pool
//!
//! Purpose:
//! Consume decoded candidates from the ingestor's bounded channel and run
//! each one through evaluate -> screen -> dispatch, strictly in that order.
//! At most `workers` candidates are processed at once; the channel is the
//! only queue, and the ingestor sheds when it is full.
//!
//! Between stages a candidate is dropped if its victim was mined or it
//! aged past the horizon. Approved opportunities are handed to the
//! coordinator as detached tasks, so a worker slot frees as soon as the
//! screen passes.
//!
//! Created: 2026-10-19

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::mempool::types::{Candidate, InFlightRegistry};
use crate::safety::SafetyScreener;
use crate::sandwich::{ExecutionCoordinator, OpportunityEvaluator};
use crate::stats::EngineStats;

const CANCEL_MINED: &str = "victim mined";
const CANCEL_EXPIRED: &str = "past horizon";

pub struct CandidatePipeline {
    evaluator: Arc<OpportunityEvaluator>,
    screener: Arc<SafetyScreener>,
    coordinator: Arc<ExecutionCoordinator>,
    inflight: InFlightRegistry,
    stats: Arc<EngineStats>,
    horizon: Duration,
}

impl CandidatePipeline {
    pub fn new(
        evaluator: Arc<OpportunityEvaluator>,
        screener: Arc<SafetyScreener>,
        coordinator: Arc<ExecutionCoordinator>,
        inflight: InFlightRegistry,
        stats: Arc<EngineStats>,
        horizon: Duration,
    ) -> Self {
        Self {
            evaluator,
            screener,
            coordinator,
            inflight,
            stats,
            horizon,
        }
    }

    /// Drain the work channel with at most `workers` candidates in flight.
    /// Returns when the channel closes and every started candidate finished.
    pub async fn run_workers(self: Arc<Self>, mut work_rx: mpsc::Receiver<Candidate>, workers: usize) {
        let permits = Arc::new(Semaphore::new(workers.max(1)));
        info!("Worker pool started: {} workers", workers.max(1));

        while let Some(candidate) = work_rx.recv().await {
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.handle(candidate).await;
                drop(permit);
            });
        }

        // wait for the tail
        let _ = permits.acquire_many(workers.max(1) as u32).await;
        info!("Worker pool drained");
    }

    /// Process one candidate, log by severity, release it from the in-flight set
    pub async fn handle(&self, candidate: Candidate) {
        let tx_hash = candidate.intent.tx_hash;
        match self.process(&candidate).await {
            Ok(()) => {}
            Err(PipelineError::Cancelled(why)) => {
                if why == CANCEL_EXPIRED {
                    EngineStats::bump(&self.stats.expired);
                } else {
                    EngineStats::bump(&self.stats.cancelled);
                }
                debug!("CANCELLED {}: {}", tx_hash, why);
            }
            Err(e) if e.is_expected() => debug!("DROP {}: {}", tx_hash, e),
            Err(e) => {
                EngineStats::bump(&self.stats.faults);
                warn!("FAULT {}: {}", tx_hash, e);
            }
        }
        self.inflight.release(&tx_hash);
    }

    /// evaluate -> screen -> dispatch
    pub async fn process(&self, candidate: &Candidate) -> Result<(), PipelineError> {
        let intent = &candidate.intent;
        self.checkpoint(candidate)?;

        EngineStats::bump(&self.stats.evaluated);
        let opportunity = self.evaluator.evaluate_fresh(intent)?;
        EngineStats::bump(&self.stats.opportunities);
        self.checkpoint(candidate)?;

        let verdict = self
            .screener
            .screen(intent.token_out, intent.pool, opportunity.expected_front_run_output)
            .await;
        if let Some(reason) = verdict.reject_reason() {
            EngineStats::bump(&self.stats.screened_out);
            return Err(PipelineError::SafetyRejected {
                token: intent.token_out,
                reason: reason.clone(),
            });
        }
        self.checkpoint(candidate)?;

        EngineStats::bump(&self.stats.dispatched);
        info!(
            "DISPATCH {} | {} | front={} net={} floor={}",
            intent.tx_hash,
            intent.function_name,
            opportunity.front_run_amount,
            opportunity.expected_net_profit,
            opportunity.min_acceptable_profit
        );
        self.coordinator.spawn(opportunity, verdict);
        Ok(())
    }

    fn checkpoint(&self, candidate: &Candidate) -> Result<(), PipelineError> {
        if candidate.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(CANCEL_MINED));
        }
        if candidate.intent.is_expired(self.horizon) {
            return Err(PipelineError::Cancelled(CANCEL_EXPIRED));
        }
        Ok(())
    }
}
