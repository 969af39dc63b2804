//! Snapshot persistence
//!
//! A versioned JSON bundle of market history, account, ledger and clock
//! position, keyed by symbol and timeframe.

use crate::broker::{Account, SimBroker};
use crate::clock::{ClockError, Cursor, SimClock, Span};
use crate::ledger::TradeLedger;
use crate::market::{Candle, MarketDataStore, PricePoint, SymbolMeta, Tick, Timeframe};
use crate::sim::{SimState, SimulationContext};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot load/save errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("Invalid snapshot clock: {0}")]
    Clock(#[from] ClockError),
    #[error("Inconsistent ledger: open positions, margins and tickets disagree")]
    InconsistentLedger,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

/// Everything needed to resume a simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub span: Span,
    pub cursor: Cursor,
    pub symbols: Vec<SymbolMeta>,
    pub rates: BTreeMap<String, BTreeMap<Timeframe, Vec<Candle>>>,
    pub ticks: BTreeMap<String, Vec<Tick>>,
    pub prices: BTreeMap<String, Vec<PricePoint>>,
    pub account: Account,
    pub ledger: TradeLedger,
    /// Quote age tolerance in milliseconds
    #[serde(default)]
    pub max_quote_age_ms: Option<i64>,
}

impl Snapshot {
    /// Capture the full simulation state
    pub fn capture(state: &SimState) -> Self {
        let mut rates = BTreeMap::new();
        let mut ticks = BTreeMap::new();
        let mut prices = BTreeMap::new();

        for (symbol, series) in state.store.all_series() {
            if !series.ticks.is_empty() {
                ticks.insert(symbol.clone(), series.ticks.as_slice().to_vec());
            }
            if !series.prices.is_empty() {
                prices.insert(symbol.clone(), series.prices.as_slice().to_vec());
            }
            let by_timeframe: BTreeMap<Timeframe, Vec<Candle>> = series
                .rates
                .iter()
                .map(|(tf, candles)| (*tf, candles.as_slice().to_vec()))
                .collect();
            if !by_timeframe.is_empty() {
                rates.insert(symbol.clone(), by_timeframe);
            }
        }

        Self {
            version: SNAPSHOT_VERSION,
            span: *state.clock.span(),
            cursor: state.clock.cursor(),
            symbols: state.store.symbols().cloned().collect(),
            rates,
            ticks,
            prices,
            account: state.broker.account().clone(),
            ledger: state.broker.ledger().clone(),
            max_quote_age_ms: state.store.max_quote_age().map(|d| d.num_milliseconds()),
        }
    }

    /// Write as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;

        tracing::info!(
            path = %path.display(),
            symbols = self.symbols.len(),
            cursor = self.cursor.index,
            "Snapshot saved"
        );
        Ok(())
    }

    /// Read and validate a snapshot file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        let snapshot = Self::from_value(value)?;

        tracing::info!(
            path = %path.display(),
            symbols = snapshot.symbols.len(),
            cursor = snapshot.cursor.index,
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Parse and validate a snapshot from a JSON string
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, SnapshotError> {
        let header = Header::deserialize(&value)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let snapshot: Snapshot = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the cursor against the span and the ledger's internal links
    pub fn validate(&self) -> Result<(), SnapshotError> {
        self.span.validate(&self.cursor)?;
        if !self.ledger.is_consistent() {
            return Err(SnapshotError::InconsistentLedger);
        }
        Ok(())
    }

    /// Rebuild the simulation state
    ///
    /// Series of symbols without metadata are dropped with a warning.
    pub fn into_state(self) -> Result<SimState, SnapshotError> {
        self.validate()?;

        let clock = SimClock::at(self.span, self.cursor)?;
        let mut store = MarketDataStore::new()
            .with_max_quote_age(self.max_quote_age_ms.map(Duration::milliseconds));
        for meta in self.symbols {
            store.insert_symbol(meta);
        }

        for (symbol, ticks) in self.ticks {
            if let Err(e) = store.insert_ticks(&symbol, ticks) {
                tracing::warn!(symbol = %symbol, error = %e, "Dropping tick series");
            }
        }
        for (symbol, prices) in self.prices {
            if let Err(e) = store.insert_prices(&symbol, prices) {
                tracing::warn!(symbol = %symbol, error = %e, "Dropping price series");
            }
        }
        for (symbol, by_timeframe) in self.rates {
            for (timeframe, candles) in by_timeframe {
                if let Err(e) = store.insert_rates(&symbol, timeframe, candles) {
                    tracing::warn!(symbol = %symbol, %timeframe, error = %e, "Dropping candle series");
                }
            }
        }

        Ok(SimState {
            clock,
            store,
            broker: SimBroker::from_parts(self.account, self.ledger),
        })
    }
}

impl SimulationContext {
    /// Build a context from a loaded snapshot
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        let state = snapshot.into_state()?;
        Ok(Self::new(state.clock, state.store, state.broker))
    }

    /// Capture the current state
    pub async fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&*self.read().await)
    }
}
