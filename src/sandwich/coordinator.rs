//! Execution Coordinator
//!
//! Purpose:
//! Turn one approved Opportunity into at most one on-chain outcome.
//!
//! State machine:
//! Idle -> Building -> Simulating -> Submitted -> {Included | Reverted | NotIncluded}
//!
//! - Idle:       verdict, horizon, cooldown and pool-version checks.
//!               A moved pool is re-evaluated once before building.
//! - Building:   sign front-run / back-run around the victim.
//! - Simulating: eth_callBundle on the latest block. Any revert aborts
//!               here; nothing is submitted. Dry-run mode stops here.
//! - Submitted:  offered to builders for the target window, then the
//!               back-run receipt is polled until the window closes.
//!
//! NotIncluded is retried once with a fresh evaluation, unless the
//! victim was mined without us or the recompute no longer pays.
//! Reverted is the on-chain profit floor doing its job; it feeds the
//! per-token cooldown, never an error.
//!
//! Created: 2026-10-19

use alloy::primitives::Address;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bundle::BundleBuilder;
use super::cooldown::TokenCooldown;
use super::evaluator::OpportunityEvaluator;
use crate::error::PipelineError;
use crate::node::{NodeQuery, ReceiptStatus};
use crate::pool::state::PoolStateCache;
use crate::relay::BundleRelay;
use crate::stats::EngineStats;
use crate::types::{Bundle, ExecutionOutcome, ExecutionResult, Opportunity, SafetyVerdict};

/// First submission plus one retry
const MAX_SUBMISSIONS: u32 = 2;

/// Consecutive failed polls tolerated while waiting for inclusion
const MAX_POLL_ERRORS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Building,
    Simulating,
    Submitted,
    Included,
    Reverted,
    NotIncluded,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Stop after Simulating
    pub dry_run: bool,
    /// Intent horizon; checked before every build
    pub horizon: Duration,
    pub rpc_timeout: Duration,
    /// Whole submission call, all endpoints and blocks
    pub submit_timeout: Duration,
    pub poll_interval: Duration,
    /// Upper bound on waiting for the target window to close
    pub inclusion_timeout: Duration,
}

pub struct ExecutionCoordinator {
    evaluator: Arc<OpportunityEvaluator>,
    cache: PoolStateCache,
    builder: BundleBuilder,
    relay: Arc<dyn BundleRelay>,
    node: Arc<dyn NodeQuery>,
    cooldown: Mutex<TokenCooldown>,
    stats: Arc<EngineStats>,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        evaluator: Arc<OpportunityEvaluator>,
        cache: PoolStateCache,
        builder: BundleBuilder,
        relay: Arc<dyn BundleRelay>,
        node: Arc<dyn NodeQuery>,
        cooldown: TokenCooldown,
        stats: Arc<EngineStats>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            evaluator,
            cache,
            builder,
            relay,
            node,
            cooldown: Mutex::new(cooldown),
            stats,
            config,
        }
    }

    /// Run `execute` as a detached task so slow inclusion never blocks workers
    pub fn spawn(self: &Arc<Self>, opportunity: Opportunity, verdict: SafetyVerdict) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let victim = opportunity.intent.tx_hash;
            match this.execute(opportunity, &verdict).await {
                Ok(result) => {
                    this.stats.record_outcome(&result.outcome);
                    info!(
                        "EXECUTION {} | victim {} | token {} | attempts {}",
                        result.outcome.label().to_uppercase(),
                        result.victim,
                        result.token,
                        result.attempts
                    );
                }
                Err(e) if e.is_expected() => debug!("Execution dropped {}: {}", victim, e),
                Err(e) => {
                    EngineStats::bump(&this.stats.faults);
                    warn!("Execution failed {}: {}", victim, e);
                }
            }
        })
    }

    /// Drive one opportunity to a terminal result
    pub async fn execute(
        &self,
        opportunity: Opportunity,
        verdict: &SafetyVerdict,
    ) -> Result<ExecutionResult, PipelineError> {
        let token = opportunity.intent.token_out;
        if let Some(reason) = verdict.reject_reason() {
            return Err(PipelineError::SafetyRejected {
                token,
                reason: reason.clone(),
            });
        }
        if verdict.token != token {
            return Err(PipelineError::External(format!(
                "verdict for {} does not cover {}",
                verdict.token, token
            )));
        }

        let mut opportunity = opportunity;
        let mut attempt = 1;
        loop {
            let mut state = ExecutionState::Idle;
            if opportunity.intent.is_expired(self.config.horizon) {
                return Ok(self.finish(&opportunity, None, attempt - 1, ExecutionOutcome::Expired));
            }

            let block = self.call("block number", self.node.block_number()).await?;
            if self.cooldown.lock().await.is_blocked(&token, block) {
                return Err(PipelineError::CoolingDown(token));
            }
            opportunity = self.refresh(opportunity)?;

            self.transition(&opportunity, &mut state, ExecutionState::Building);
            let bundle = self
                .builder
                .build(&opportunity, block, attempt)
                .await
                .map_err(|e| PipelineError::External(format!("bundle build: {:#}", e)))?;

            self.transition(&opportunity, &mut state, ExecutionState::Simulating);
            let simulation = self
                .call("bundle simulation", self.relay.simulate(&bundle, block))
                .await?;
            if !simulation.success {
                EngineStats::bump(&self.stats.sim_reverts);
                return Err(PipelineError::SimulationRevert {
                    tx: simulation.reverted_tx,
                    reason: simulation.reason.unwrap_or_else(|| "unknown".to_string()),
                });
            }
            if self.config.dry_run {
                info!(
                    "DRY RUN {} | front={} net={} floor={} | sim gas {}",
                    opportunity.intent.tx_hash,
                    opportunity.front_run_amount,
                    opportunity.expected_net_profit,
                    opportunity.min_acceptable_profit,
                    simulation.gas_used
                );
                return Ok(self.finish(&opportunity, None, attempt, ExecutionOutcome::DryRun));
            }

            // never submit against a snapshot the cache has moved past
            if self.cache.version(opportunity.intent.pool)? != opportunity.pool_version {
                return Err(PipelineError::StaleState {
                    pool: opportunity.intent.pool,
                });
            }

            match tokio::time::timeout(self.config.submit_timeout, self.relay.submit(&bundle)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(PipelineError::SubmissionFailure(format!("{:#}", e))),
                Err(_) => return Err(PipelineError::SubmissionFailure("timed out".to_string())),
            }
            EngineStats::bump(&self.stats.submitted);
            self.transition(&opportunity, &mut state, ExecutionState::Submitted);

            match self.await_inclusion(&bundle).await {
                Ok(ExecutionOutcome::Included { block }) => {
                    self.transition(&opportunity, &mut state, ExecutionState::Included);
                    self.cooldown.lock().await.record_inclusion(&token);
                    return Ok(self.finish(
                        &opportunity,
                        Some(&bundle),
                        attempt,
                        ExecutionOutcome::Included { block },
                    ));
                }
                Ok(ExecutionOutcome::Reverted(reason)) => {
                    self.transition(&opportunity, &mut state, ExecutionState::Reverted);
                    let block = match self.call("block number", self.node.block_number()).await {
                        Ok(block) => block,
                        Err(e) => {
                            debug!("{}; cooldown keyed to block {}", e, bundle.last_target_block());
                            bundle.last_target_block()
                        }
                    };
                    self.cooldown.lock().await.record_revert(token, block);
                    return Ok(self.finish(
                        &opportunity,
                        Some(&bundle),
                        attempt,
                        ExecutionOutcome::Reverted(reason),
                    ));
                }
                Ok(other) => {
                    return Ok(self.finish(&opportunity, Some(&bundle), attempt, other));
                }
                Err(PipelineError::InclusionTimeout) => {
                    self.transition(&opportunity, &mut state, ExecutionState::NotIncluded);
                }
                Err(e) => return Err(e),
            }

            if attempt >= MAX_SUBMISSIONS || self.victim_mined(&bundle).await {
                return Ok(self.finish(&opportunity, Some(&bundle), attempt, ExecutionOutcome::NotIncluded));
            }
            match self.evaluator.evaluate_fresh(&opportunity.intent) {
                Ok(fresh) => {
                    debug!(
                        "Retrying {} on pool v{} (was v{})",
                        fresh.intent.tx_hash, fresh.pool_version, opportunity.pool_version
                    );
                    opportunity = fresh;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Abandoning {} after miss: {}", opportunity.intent.tx_hash, e);
                    return Ok(self.finish(&opportunity, Some(&bundle), attempt, ExecutionOutcome::NotIncluded));
                }
            }
        }
    }

    /// Drop cooldowns that expired before `block`
    pub async fn cleanup_cooldowns(&self, block: u64) -> usize {
        self.cooldown.lock().await.cleanup(block)
    }

    pub async fn cooldown_counts(&self) -> (usize, usize) {
        self.cooldown.lock().await.counts()
    }

    pub async fn is_cooling(&self, token: &Address, block: u64) -> bool {
        self.cooldown.lock().await.is_blocked(token, block)
    }

    /// Re-evaluate once if the pool moved since the opportunity was sized
    fn refresh(&self, opportunity: Opportunity) -> Result<Opportunity, PipelineError> {
        let current = self.cache.version(opportunity.intent.pool)?;
        if current == opportunity.pool_version {
            return Ok(opportunity);
        }
        debug!(
            "Pool {} moved v{} -> v{} before build, re-evaluating {}",
            opportunity.intent.pool, opportunity.pool_version, current, opportunity.intent.tx_hash
        );
        self.evaluator.evaluate_fresh(&opportunity.intent)
    }

    /// Poll the back-run receipt until the target window closes
    async fn await_inclusion(&self, bundle: &Bundle) -> Result<ExecutionOutcome, PipelineError> {
        let poll = async {
            let mut errors = 0u32;
            loop {
                match self.poll_once(bundle).await {
                    Ok(Some(outcome)) => return Ok(outcome),
                    Ok(None) => errors = 0,
                    Err(e) => {
                        errors += 1;
                        debug!("Inclusion poll failed ({}/{}): {}", errors, MAX_POLL_ERRORS, e);
                        if errors >= MAX_POLL_ERRORS {
                            return Err(e);
                        }
                    }
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };
        tokio::time::timeout(self.config.inclusion_timeout, poll)
            .await
            .unwrap_or(Err(PipelineError::InclusionTimeout))
    }

    /// Some(outcome) once decided, None to keep waiting
    async fn poll_once(&self, bundle: &Bundle) -> Result<Option<ExecutionOutcome>, PipelineError> {
        let receipt = self
            .call("back-run receipt", self.node.receipt_status(bundle.back_run.hash))
            .await?;
        match receipt {
            Some(ReceiptStatus::Success { block }) => return Ok(Some(ExecutionOutcome::Included { block })),
            Some(ReceiptStatus::Failed { block }) => {
                return Ok(Some(ExecutionOutcome::Reverted(format!(
                    "back-run reverted in block {}",
                    block
                ))))
            }
            None => {}
        }
        let current = self.call("block number", self.node.block_number()).await?;
        if current > bundle.last_target_block() {
            return Err(PipelineError::InclusionTimeout);
        }
        Ok(None)
    }

    async fn victim_mined(&self, bundle: &Bundle) -> bool {
        matches!(
            self.call("victim receipt", self.node.receipt_status(bundle.victim)).await,
            Ok(Some(_))
        )
    }

    async fn call<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, PipelineError> {
        match tokio::time::timeout(self.config.rpc_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(PipelineError::External(format!("{}: {:#}", what, e))),
            Err(_) => Err(PipelineError::External(format!("{}: timed out", what))),
        }
    }

    fn transition(&self, opportunity: &Opportunity, state: &mut ExecutionState, next: ExecutionState) {
        debug!("{}: {:?} -> {:?}", opportunity.intent.tx_hash, state, next);
        *state = next;
    }

    fn finish(
        &self,
        opportunity: &Opportunity,
        bundle: Option<&Bundle>,
        attempts: u32,
        outcome: ExecutionOutcome,
    ) -> ExecutionResult {
        ExecutionResult {
            victim: opportunity.intent.tx_hash,
            back_run: bundle.map(|b| b.back_run.hash),
            token: opportunity.intent.token_out,
            attempts,
            outcome,
            realized_profit: None,
            finished_at: Utc::now(),
        }
    }
}
