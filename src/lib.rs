//! lockstep: deterministic lock-stepped backtest simulator
//!
//! This library provides the core components for:
//! - A simulation clock over a fixed replay span
//! - Historical ticks and candles queried without look-ahead
//! - A trade ledger of positions, orders and deals
//! - A simulated margin broker with settlement and stop-out
//! - A round barrier keeping strategy tasks in lock-step
//! - Snapshot save/load and Parquet history import
//! - Logging and Prometheus metrics

pub mod broker;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data;
pub mod ledger;
pub mod market;
pub mod sim;
pub mod snapshot;
pub mod sync;
pub mod telemetry;
