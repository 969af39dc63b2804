//! Simulated broker module
//!
//! Validates and executes trade requests against the ledger, and runs the
//! per-round settlement pass (repricing, stops, stop-out).

mod account;
mod engine;
mod request;
mod settlement;

pub use account::{Account, StopOutMode};
pub use engine::SimBroker;
pub use request::{CheckResult, RetCode, SendResult, TradeAction, TradeRequest};
pub use settlement::SettlementReport;
