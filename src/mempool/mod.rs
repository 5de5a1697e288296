//! Mempool ingestion
//!
//! Purpose:
//!     Turn the pending-transaction feed into decoded swap candidates.
//!
//! Architecture:
//!     types.rs   - RawPendingTx, Candidate, cancellation flags, in-flight registry
//!     decoder.rs - router calldata -> PendingSwapIntent against the pool registry
//!     monitor.rs - feed subscription loop, bounded hand-off, mined-block watcher
//!
//! Created: 2026-10-19

pub mod decoder;
pub mod monitor;
pub mod types;

pub use decoder::SwapDecoder;
pub use monitor::{run_block_watcher, IngestConfig, MempoolIngestor};
pub use types::{Candidate, InFlightRegistry, RawPendingTx};
