//! Error taxonomy
//!
//! Every variant except `PipelineError::FeedDisconnected` is recovered
//! inside the pipeline. Glue code (RPC adapters, config) uses anyhow.

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

use crate::types::{PoolId, RejectReason};

/// Swap decoder rejects. Discarded, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("contract creation, not a swap")]
    ContractCreation,

    #[error("call to untracked contract {0}")]
    UntrackedContract(Address),

    #[error("calldata shorter than a selector")]
    ShortCalldata,

    #[error("unknown selector {0}")]
    UnknownSelector(String),

    #[error("malformed calldata for {0}")]
    Malformed(&'static str),

    #[error("unsupported call {0}")]
    UnsupportedCall(&'static str),

    #[error("path touches untracked pool {0}/{1}")]
    UntrackedPool(Address, Address),

    #[error("path has {hops} hops, limit is {limit}")]
    HopLimit { hops: usize, limit: usize },

    #[error("zero input amount")]
    ZeroAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("pool {0} is not tracked")]
    NotTracked(PoolId),

    #[error("pool {0} is stale pending resync")]
    Stale(PoolId),

    #[error("corrupt reserve update for {pool}: {reason}")]
    CorruptFeed { pool: PoolId, reason: String },
}

/// Per-candidate pipeline failures
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("pool state: {0}")]
    Cache(#[from] CacheError),

    #[error("pool {pool} advanced past the evaluated version twice")]
    StaleState { pool: PoolId },

    #[error("no profitable counter-trade")]
    NoOpportunity,

    #[error("bundle simulation reverted: {reason}")]
    SimulationRevert { tx: Option<TxHash>, reason: String },

    #[error("expected profit below minimum")]
    BelowMinimumProfit,

    #[error("token {token} rejected: {reason}")]
    SafetyRejected { token: Address, reason: RejectReason },

    #[error("token {0} is in revert cooldown")]
    CoolingDown(Address),

    #[error("submission failed on every builder: {0}")]
    SubmissionFailure(String),

    #[error("bundle not included within target window")]
    InclusionTimeout,

    #[error("candidate cancelled: {0}")]
    Cancelled(&'static str),

    #[error("external call failed: {0}")]
    External(String),

    #[error("pending transaction feed lost: {0}")]
    FeedDisconnected(String),
}

impl PipelineError {
    /// Designed discard paths, frequent and not a sign of a bug.
    /// Everything else deserves a warning.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode(_)
                | PipelineError::NoOpportunity
                | PipelineError::BelowMinimumProfit
                | PipelineError::SafetyRejected { .. }
                | PipelineError::CoolingDown(_)
                | PipelineError::Cancelled(_)
                | PipelineError::StaleState { .. }
                | PipelineError::InclusionTimeout
        )
    }

    /// Only total feed loss escapes the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::FeedDisconnected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_vs_fault() {
        assert!(PipelineError::BelowMinimumProfit.is_expected());
        assert!(PipelineError::SafetyRejected {
            token: Address::ZERO,
            reason: RejectReason::NoCode
        }
        .is_expected());
        assert!(!PipelineError::SimulationRevert {
            tx: None,
            reason: "boom".into()
        }
        .is_expected());
        assert!(PipelineError::FeedDisconnected("eof".into()).is_fatal());
        assert!(!PipelineError::NoOpportunity.is_fatal());
    }

    #[test]
    fn test_decode_error_converts() {
        let err: PipelineError = DecodeError::ZeroAmount.into();
        assert!(matches!(err, PipelineError::Decode(DecodeError::ZeroAmount)));
    }
}
