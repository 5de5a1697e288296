//! Core data model for the sandwich pipeline
//!
//! Purpose:
//!     Value types that flow Intent -> Opportunity -> (Verdict, Bundle) -> ExecutionResult.
//!     Everything here is immutable once built; the pool cache hands out
//!     `PoolReserves` clones, never references.
//!
//! Created: 2026-10-19

use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pool::calculator::SwapMath;

/// Pools are identified by their contract address
pub type PoolId = Address;

/// Pool math variant, resolved once when the pool is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// x * y = k (Uniswap V2 and forks)
    ConstantProduct,
    /// Tick-based liquidity (Uniswap V3 style); decoded but not sized
    ConcentratedLiquidity { fee_tier: u32 },
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PoolKind::ConstantProduct => write!(f, "ConstantProduct"),
            PoolKind::ConcentratedLiquidity { fee_tier } => {
                write!(f, "ConcentratedLiquidity({})", fee_tier)
            }
        }
    }
}

/// Snapshot of one pool's reserves.
///
/// Owned by `PoolStateCache`; every consumer receives a value copy.
/// `version` increments on every cache write for this pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolReserves {
    pub pool: PoolId,
    pub kind: PoolKind,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
    pub fee_bps: u32,
    pub version: u64,
    pub last_updated: Instant,
}

impl PoolReserves {
    /// Returns (reserve_in, reserve_out) for a swap that sells `token_in`.
    pub fn reserves_for(&self, token_in: Address) -> Option<(U256, U256)> {
        if token_in == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if token_in == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// The other side of the pair
    pub fn counter_token(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// Output of selling `amount_in` of `token_in` against this snapshot
    pub fn quote(&self, token_in: Address, amount_in: U256) -> Option<U256> {
        let (reserve_in, reserve_out) = self.reserves_for(token_in)?;
        SwapMath::get_amount_out(amount_in, reserve_in, reserve_out, self.fee_bps)
    }

    /// Project the pool after a swap without touching the cache.
    /// Returns (amount_out, projected snapshot). The projection keeps the
    /// source version: it is speculative state, not a cache write.
    pub fn after_swap(&self, token_in: Address, amount_in: U256) -> Option<(U256, PoolReserves)> {
        let amount_out = self.quote(token_in, amount_in)?;
        let mut next = self.clone();
        if token_in == self.token0 {
            next.reserve0 = self.reserve0.checked_add(amount_in)?;
            next.reserve1 = self.reserve1.checked_sub(amount_out)?;
        } else {
            next.reserve1 = self.reserve1.checked_add(amount_in)?;
            next.reserve0 = self.reserve0.checked_sub(amount_out)?;
        }
        Some((amount_out, next))
    }

    /// Spot price of `token_in` in units of the counter token
    pub fn spot_price(&self, token_in: Address) -> f64 {
        match self.reserves_for(token_in) {
            Some((reserve_in, reserve_out)) if !reserve_in.is_zero() => {
                u256_to_f64(reserve_out) / u256_to_f64(reserve_in)
            }
            _ => 0.0,
        }
    }
}

/// A decoded victim swap, observed before inclusion.
#[derive(Debug, Clone)]
pub struct PendingSwapIntent {
    pub tx_hash: TxHash,
    pub pool: PoolId,
    pub pool_kind: PoolKind,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    /// Zero when the victim declared no bound (or it is unknown, e.g. multi-hop)
    pub min_amount_out: U256,
    /// Legacy gas price or EIP-1559 max fee, wei
    pub gas_price: u128,
    pub observed_at: Instant,
    /// Router function the intent came from (e.g. "swapExactTokensForTokens")
    pub function_name: &'static str,
    /// Signed victim transaction, forwarded verbatim into the bundle
    pub raw_tx: Bytes,
}

impl PendingSwapIntent {
    pub fn age(&self) -> Duration {
        self.observed_at.elapsed()
    }

    pub fn is_expired(&self, horizon: Duration) -> bool {
        self.age() >= horizon
    }
}

/// A sized, priced counter-trade. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub intent: Arc<PendingSwapIntent>,
    pub pool_version: u64,
    pub front_run_amount: U256,
    /// token_out received by the front-run leg
    pub expected_front_run_output: U256,
    /// What the victim still receives after being front-run
    pub expected_victim_output: U256,
    /// token_in received when the front-run output is sold back
    pub expected_back_run_output: U256,
    /// back-run output minus front-run input, before any cost
    pub gross_profit: U256,
    pub flash_fee: U256,
    pub gas_cost: U256,
    pub expected_net_profit: U256,
    /// Floor enforced by the settlement contract (token_in units)
    pub min_acceptable_profit: U256,
}

/// Why the safety screener refused a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Denylisted(String),
    NoCode,
    AdminBlacklist(String),
    AdminPausable(String),
    SimulationRevert(String),
    ExcessiveTransferFee { shortfall_bps: u64 },
    InsufficientLiquidity,
    /// A stage could not complete (timeout, RPC failure, missing pool state)
    StageUnavailable(String),
}

impl RejectReason {
    /// Short stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Denylisted(_) => "denylisted",
            RejectReason::NoCode => "no-code",
            RejectReason::AdminBlacklist(_) => "admin-blacklist",
            RejectReason::AdminPausable(_) => "admin-pausable",
            RejectReason::SimulationRevert(_) => "simulation-revert",
            RejectReason::ExcessiveTransferFee { .. } => "excessive-transfer-fee",
            RejectReason::InsufficientLiquidity => "insufficient-liquidity",
            RejectReason::StageUnavailable(_) => "stage-unavailable",
        }
    }

    /// Rejections that depend on transient conditions or on the planned
    /// amount are not cached against the token.
    pub fn is_cacheable(&self) -> bool {
        !matches!(
            self,
            RejectReason::StageUnavailable(_) | RejectReason::InsufficientLiquidity
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RejectReason::Denylisted(why) => write!(f, "denylisted: {}", why),
            RejectReason::NoCode => write!(f, "no-code"),
            RejectReason::AdminBlacklist(sig) => write!(f, "admin-blacklist: {}", sig),
            RejectReason::AdminPausable(sig) => write!(f, "admin-pausable: {}", sig),
            RejectReason::SimulationRevert(msg) => write!(f, "simulation-revert: {}", msg),
            RejectReason::ExcessiveTransferFee { shortfall_bps } => {
                write!(f, "excessive-transfer-fee: {}bps shortfall", shortfall_bps)
            }
            RejectReason::InsufficientLiquidity => write!(f, "insufficient-liquidity"),
            RejectReason::StageUnavailable(stage) => write!(f, "stage-unavailable: {}", stage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictOutcome {
    Approved,
    Rejected(RejectReason),
}

/// What the screener saw while deciding
#[derive(Debug, Clone, Default)]
pub struct VerdictEvidence {
    pub allowlisted: bool,
    /// Admin/fee function signatures found in the bytecode
    pub flagged_functions: Vec<&'static str>,
    pub probe_amount: Option<U256>,
    pub probe_bought: Option<U256>,
    pub probe_proceeds: Option<U256>,
    pub theoretical_proceeds: Option<U256>,
}

#[derive(Debug, Clone)]
pub struct SafetyVerdict {
    pub token: Address,
    pub outcome: VerdictOutcome,
    pub evidence: VerdictEvidence,
    pub evaluated_at: Instant,
    pub evaluated_at_utc: DateTime<Utc>,
}

impl SafetyVerdict {
    pub fn approved(token: Address, evidence: VerdictEvidence) -> Self {
        Self::new(token, VerdictOutcome::Approved, evidence)
    }

    pub fn rejected(token: Address, reason: RejectReason, evidence: VerdictEvidence) -> Self {
        Self::new(token, VerdictOutcome::Rejected(reason), evidence)
    }

    fn new(token: Address, outcome: VerdictOutcome, evidence: VerdictEvidence) -> Self {
        Self {
            token,
            outcome,
            evidence,
            evaluated_at: Instant::now(),
            evaluated_at_utc: Utc::now(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self.outcome, VerdictOutcome::Approved)
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match &self.outcome {
            VerdictOutcome::Rejected(reason) => Some(reason),
            VerdictOutcome::Approved => None,
        }
    }
}

/// A signed transaction ready for a bundle
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub hash: TxHash,
    pub raw: Bytes,
}

/// front-run -> victim -> back-run, for a window of target blocks
#[derive(Debug, Clone)]
pub struct Bundle {
    pub front_run: SignedTx,
    pub victim: TxHash,
    pub victim_raw: Bytes,
    pub back_run: SignedTx,
    pub target_block: u64,
    /// Number of consecutive blocks, starting at `target_block`, the bundle is offered for
    pub block_window: u64,
    /// 1 for the first submission, 2 for the single retry
    pub attempt: u32,
}

impl Bundle {
    /// Raw transactions in execution order
    pub fn raw_transactions(&self) -> Vec<Bytes> {
        vec![
            self.front_run.raw.clone(),
            self.victim_raw.clone(),
            self.back_run.raw.clone(),
        ]
    }

    pub fn last_target_block(&self) -> u64 {
        self.target_block + self.block_window.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Included { block: u64 },
    NotIncluded,
    /// On-chain minimum-profit floor failed; the designed fail-safe path
    Reverted(String),
    /// Intent aged past the horizon before it could be submitted
    Expired,
    /// Dry-run mode: built and simulated, never submitted
    DryRun,
}

impl ExecutionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Included { .. } => "included",
            ExecutionOutcome::NotIncluded => "not-included",
            ExecutionOutcome::Reverted(_) => "reverted",
            ExecutionOutcome::Expired => "expired",
            ExecutionOutcome::DryRun => "dry-run",
        }
    }
}

/// Terminal record for one candidate. Used for accounting and backoff only.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub victim: TxHash,
    pub back_run: Option<TxHash>,
    pub token: Address,
    pub attempts: u32,
    pub outcome: ExecutionOutcome,
    pub realized_profit: Option<U256>,
    pub finished_at: DateTime<Utc>,
}

/// Lossy conversion for ratios and log output
pub fn u256_to_f64(value: U256) -> f64 {
    if value > U256::from(u128::MAX) {
        return f64::MAX;
    }
    value.to::<u128>() as f64
}
