//! Mempool Sandwich Engine Library
//!
//! Watches pending swaps on tracked constant-product pools, sizes a
//! front-run/back-run pair around each, screens the output token, and
//! hands bundles to builder relays.
//!
//! Created: 2026-10-19

pub mod config;
pub mod contracts;
pub mod error;
pub mod mempool;
pub mod node;
pub mod pipeline;
pub mod pool;
pub mod relay;
pub mod safety;
pub mod sandwich;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::PipelineError;
pub use pipeline::CandidatePipeline;
pub use pool::PoolStateCache;
pub use types::{Bundle, ExecutionOutcome, Opportunity, PendingSwapIntent, SafetyVerdict};
