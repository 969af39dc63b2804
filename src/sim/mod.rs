//! Simulation module
//!
//! The explicitly constructed context strategies trade against, and the
//! runner that drives strategy tasks through the barrier.

mod context;
mod runner;

pub use context::{RoundSettlement, SimState, SimulationContext};
pub use runner::{run_strategies, RunSummary, Step, Strategy, TaskExit, TaskReport};
