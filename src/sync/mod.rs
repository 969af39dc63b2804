//! Round synchronization module
//!
//! A cyclic barrier that keeps strategy tasks lock-stepped on the simulated
//! clock and runs one settlement per completed round.

mod barrier;

pub use barrier::{RoundSignal, Synchronizer};

use crate::clock::Cursor;
use async_trait::async_trait;
use thiserror::Error;

/// Result of one settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Clock moved to the next step
    Advanced(Cursor),
    /// The span is exhausted; no further rounds
    Finished,
}

/// Barrier errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The run was cancelled
    #[error("Simulation cancelled")]
    Cancelled,
    /// No tasks are registered with the barrier
    #[error("No tasks registered with the barrier")]
    NotRegistered,
}

/// Work run exactly once per completed round
#[async_trait]
pub trait Settlement: Send + Sync {
    /// Settle the current step and advance the clock
    async fn settle(&self) -> RoundOutcome;
}
