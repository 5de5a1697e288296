//! Pool state for the sandwich engine
//!
//! Registry of tracked pools, the versioned reserve cache, the per-pool
//! writer tasks that feed it, and constant-product swap math.

pub mod calculator;
pub mod registry;
pub mod state;
pub mod writer;

pub use calculator::{SandwichLegs, SlippageCap, SwapMath};
pub use registry::{PoolRegistry, RouterInfo, RouterKind, TrackedPool};
pub use state::PoolStateCache;
pub use writer::{PoolWriterSet, WriterConfig};
