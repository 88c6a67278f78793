// =============================================================================
// Trading engine, executor and accounting (spec.md §4.6-4.8)
// =============================================================================

pub mod accounting;
pub mod engine;
pub mod executor;

pub use engine::{CycleResult, TradingEngine};
pub use executor::Execution;
