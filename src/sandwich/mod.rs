//! Sandwich sizing and execution
//!
//! Purpose:
//!     evaluator.rs   - front-run size search, three-leg simulation, net profit
//!     bundle.rs      - settlement calldata and signed front-run / back-run legs
//!     coordinator.rs - build, simulate, submit, monitor; one outcome per opportunity
//!     cooldown.rs    - per-token revert circuit breaker
//!
//! Created: 2026-10-19

pub mod bundle;
pub mod coordinator;
pub mod cooldown;
pub mod evaluator;

pub use bundle::{BundleBuilder, BundleSigner, LocalBundleSigner, SignerConfig};
pub use coordinator::{CoordinatorConfig, ExecutionCoordinator, ExecutionState};
pub use cooldown::{CooldownState, TokenCooldown};
pub use evaluator::{EvaluatorConfig, OpportunityEvaluator};
