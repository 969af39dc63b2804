//! Configuration types for lockstep

use crate::broker::{Account, SimBroker, StopOutMode};
use crate::clock::{ClockError, SimClock, Span};
use crate::market::{MarketDataStore, SymbolMeta};
use crate::telemetry::LogFormat;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    pub data: DataConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub symbols: Vec<SymbolMeta>,
}

/// Replay span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step_secs: i64,
}

impl SimulationConfig {
    pub fn span(&self) -> Result<Span, ClockError> {
        Span::new(self.start, self.end, Duration::seconds(self.step_secs))
    }
}

/// Starting account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub balance: Decimal,
    pub leverage: Decimal,
    #[serde(default = "default_currency_digits")]
    pub currency_digits: u32,
    #[serde(default)]
    pub stop_out_mode: StopOutMode,
    pub stop_out_threshold: Decimal,
}

fn default_currency_digits() -> u32 {
    2
}

impl AccountConfig {
    pub fn account(&self) -> Account {
        Account::new(
            self.balance,
            self.leverage,
            self.currency_digits,
            self.stop_out_mode,
            self.stop_out_threshold,
        )
    }
}

/// Simulated broker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Quotes older than this count as missing; unset accepts any age
    #[serde(default)]
    pub max_quote_age_secs: Option<i64>,
}

/// Data locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Parquet tick and candle files read by `import`
    pub input_dir: PathBuf,
    /// Snapshot written by `import` and read by `replay`
    pub snapshot_path: PathBuf,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus endpoint port; no exporter when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Built-in example configuration
    pub fn example() -> anyhow::Result<Self> {
        Ok(toml::from_str(include_str!("../config.toml.example"))?)
    }

    /// Clock at the start of the configured span
    pub fn clock(&self) -> Result<SimClock, ClockError> {
        Ok(SimClock::new(self.simulation.span()?))
    }

    /// Empty store with the configured symbols registered
    pub fn market_store(&self) -> MarketDataStore {
        let mut store = MarketDataStore::new()
            .with_max_quote_age(self.broker.max_quote_age_secs.map(Duration::seconds));
        for meta in &self.symbols {
            store.insert_symbol(meta.clone());
        }
        store
    }

    pub fn broker(&self) -> SimBroker {
        SimBroker::new(self.account.account())
    }
}
