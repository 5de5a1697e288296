//! Token safety screening
//!
//! Operator lists, bytecode capability scan, and the staged screener that
//! combines them with a round-trip dry run and a liquidity-depth check.

pub mod lists;
pub mod scan;
pub mod screener;

pub use lists::TokenLists;
pub use screener::{SafetyScreener, ScreenerConfig};
