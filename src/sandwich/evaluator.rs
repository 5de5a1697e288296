//! Opportunity Evaluator
//!
//! Purpose:
//! Size and price the counter-trade for one victim swap against one pool
//! snapshot. Pure arithmetic: no I/O, no suspension, deterministic for a
//! given (intent, snapshot) pair.
//!
//! Steps:
//! 1. constant-product pools only
//! 2. victim must move the spot price by at least `min_impact_bps`
//! 3. front-run ceiling: the smaller of `safety_margin_bps` and
//!    `max_reserve_fraction_bps` of the input reserve
//! 4. lowered to the largest size the victim's minimum output tolerates
//! 5. profit-maximizing front-run under that ceiling, exact simulation
//! 6. net of flash-loan fee and gas, at least `min_profit`
//!
//! `evaluate_fresh` wraps this with the cache read and version check.
//!
//! Created: 2026-10-19

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::PipelineError;
use crate::pool::calculator::{SlippageCap, SwapMath, BPS_DENOMINATOR};
use crate::pool::state::PoolStateCache;
use crate::types::{Opportunity, PendingSwapIntent, PoolKind, PoolReserves};

/// Recomputations allowed when the pool moves under an evaluation
const MAX_RECOMPUTES: u32 = 1;

/// Largest number of bisection steps when shrinking to the victim's bound
const MIN_OUT_SEARCH_STEPS: u32 = 48;

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Largest front-run as a fraction of the input reserve, bps (0, 10000]
    pub safety_margin_bps: u32,
    pub min_impact_bps: u32,
    /// Net profit floor, token_in units
    pub min_profit: U256,
    pub max_reserve_fraction_bps: u32,
    pub flash_fee_bps: u32,
    /// Gas for both legs together
    pub gas_units: u64,
    /// Wrapped native token; gas is only priced on pools that contain it
    pub wrapped_native: Address,
}

pub struct OpportunityEvaluator {
    cache: PoolStateCache,
    config: EvaluatorConfig,
}

impl OpportunityEvaluator {
    pub fn new(cache: PoolStateCache, config: EvaluatorConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate against the cache, discarding results computed on a version
    /// that moved underneath. Recomputes at most once, then gives up with
    /// `StaleState`.
    pub fn evaluate_fresh(&self, intent: &Arc<PendingSwapIntent>) -> Result<Opportunity, PipelineError> {
        self.evaluate_versioned(intent, |snapshot| self.evaluate(intent, snapshot))
    }

    fn evaluate_versioned<F>(
        &self,
        intent: &PendingSwapIntent,
        evaluate: F,
    ) -> Result<Opportunity, PipelineError>
    where
        F: Fn(&PoolReserves) -> Option<Opportunity>,
    {
        // not sized, and not held in the reserve cache
        if intent.pool_kind != PoolKind::ConstantProduct {
            trace!("{}: {} pool, not sized", intent.tx_hash, intent.pool_kind);
            return Err(PipelineError::NoOpportunity);
        }
        for attempt in 0..=MAX_RECOMPUTES {
            let snapshot = self.cache.get(intent.pool)?;
            let result = evaluate(&snapshot);

            if self.cache.version(intent.pool)? == snapshot.version {
                return result.ok_or(PipelineError::NoOpportunity);
            }
            debug!(
                "Pool {} moved during evaluation of {} (v{}, attempt {})",
                intent.pool, intent.tx_hash, snapshot.version, attempt + 1
            );
        }
        Err(PipelineError::StaleState { pool: intent.pool })
    }

    /// Pure evaluation against a given snapshot
    pub fn evaluate(&self, intent: &Arc<PendingSwapIntent>, pool: &PoolReserves) -> Option<Opportunity> {
        if pool.kind != PoolKind::ConstantProduct || intent.pool_kind != PoolKind::ConstantProduct {
            trace!("{}: {} pool, not sized", intent.tx_hash, pool.kind);
            return None;
        }
        let (reserve_in, reserve_out) = pool.reserves_for(intent.token_in)?;
        let victim_in = intent.amount_in;

        let impact = SwapMath::price_movement_bps(victim_in, reserve_in, reserve_out, pool.fee_bps);
        if impact < self.config.min_impact_bps as f64 {
            trace!("{}: impact {:.2}bps below threshold", intent.tx_hash, impact);
            return None;
        }

        let margin_cap = reserve_in.checked_mul(U256::from(self.config.safety_margin_bps))?
            / U256::from(BPS_DENOMINATOR);
        let depth_cap = reserve_in.checked_mul(U256::from(self.config.max_reserve_fraction_bps))?
            / U256::from(BPS_DENOMINATOR);
        let mut ceiling = margin_cap.min(depth_cap);
        match SwapMath::max_front_run_for_min_out(
            reserve_in,
            reserve_out,
            victim_in,
            intent.min_amount_out,
            pool.fee_bps,
        ) {
            SlippageCap::Unbounded => {}
            SlippageCap::Limit(cap) => ceiling = ceiling.min(cap),
            SlippageCap::Infeasible => {
                trace!("{}: victim min-out leaves no room", intent.tx_hash);
                return None;
            }
        }
        if ceiling.is_zero() {
            return None;
        }

        let ceiling = self.largest_tolerated_front_run(pool, intent, ceiling)?;
        let legs = SwapMath::optimal_front_run(pool, intent.token_in, victim_in, ceiling)?;
        let gross_profit = legs.gross_profit()?;

        let flash_fee = legs.front_run_in.checked_mul(U256::from(self.config.flash_fee_bps))?
            / U256::from(BPS_DENOMINATOR);
        let gas_cost = self.gas_cost_in_token_in(pool, intent)?;
        let net = gross_profit.checked_sub(flash_fee)?.checked_sub(gas_cost)?;

        if net < self.config.min_profit {
            trace!(
                "{}: net {} below minimum {} (gross {}, flash {}, gas {})",
                intent.tx_hash, net, self.config.min_profit, gross_profit, flash_fee, gas_cost
            );
            return None;
        }

        debug!(
            "OPPORTUNITY {} | pool {} v{} | front={} back={} | gross={} net={} | impact={:.1}bps",
            intent.tx_hash,
            pool.pool,
            pool.version,
            legs.front_run_in,
            legs.back_run_out,
            gross_profit,
            net,
            impact
        );

        Some(Opportunity {
            intent: Arc::clone(intent),
            pool_version: pool.version,
            front_run_amount: legs.front_run_in,
            expected_front_run_output: legs.front_run_out,
            expected_victim_output: legs.victim_out,
            expected_back_run_output: legs.back_run_out,
            gross_profit,
            flash_fee,
            gas_cost,
            expected_net_profit: net,
            // the back-run must clear gas plus the operator floor on-chain
            min_acceptable_profit: gas_cost.saturating_add(self.config.min_profit),
        })
    }

    /// Largest front-run up to `ceiling` after which the victim still clears
    /// its minimum. Victim output only falls as the front-run grows, so a
    /// bisection finds it.
    fn largest_tolerated_front_run(
        &self,
        pool: &PoolReserves,
        intent: &PendingSwapIntent,
        ceiling: U256,
    ) -> Option<U256> {
        let tolerated = |front_run: U256| {
            SwapMath::simulate_sandwich(pool, intent.token_in, front_run, intent.amount_in)
                .is_some_and(|legs| legs.victim_out >= intent.min_amount_out)
        };
        if tolerated(ceiling) {
            return Some(ceiling);
        }

        let (mut lo, mut hi) = (U256::ZERO, ceiling);
        for _ in 0..MIN_OUT_SEARCH_STEPS {
            if hi <= lo + U256::from(1) {
                break;
            }
            let mid = (lo + hi) >> 1;
            if tolerated(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        if lo.is_zero() {
            debug!("{}: victim tolerates no front-run", intent.tx_hash);
            return None;
        }
        Some(lo)
    }

    /// gas_units * victim gas price, converted to token_in at the pool's spot
    /// price when token_in is not the wrapped native token.
    fn gas_cost_in_token_in(&self, pool: &PoolReserves, intent: &PendingSwapIntent) -> Option<U256> {
        let gas_wei = U256::from(self.config.gas_units).checked_mul(U256::from(intent.gas_price))?;
        if gas_wei.is_zero() || intent.token_in == self.config.wrapped_native {
            return Some(gas_wei);
        }
        if intent.token_out == self.config.wrapped_native {
            let (reserve_in, reserve_out) = pool.reserves_for(intent.token_in)?;
            return Some(gas_wei.checked_mul(reserve_in)? / reserve_out);
        }
        trace!("{}: no native leg to price gas", intent.tx_hash);
        None
    }
}
