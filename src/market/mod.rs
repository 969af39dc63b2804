//! Market data module
//!
//! Historical ticks, candles and symbol metadata, queried without look-ahead

mod series;
mod store;
mod types;

pub use series::Series;
pub use store::{MarketDataStore, SymbolSeries};
pub use types::{Candle, PricePoint, SymbolMeta, Tick, Timeframe, Timestamped, Window};

use crate::broker::Account;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Market data lookup errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Symbol has no metadata
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    /// No quote at or before the requested time
    #[error("No quote for {symbol} at {time}")]
    NoQuote { symbol: String, time: DateTime<Utc> },
    /// Latest quote is older than the allowed age
    #[error("Stale quote for {symbol} at {time} (last quote {quote_time})")]
    StaleQuote {
        symbol: String,
        time: DateTime<Utc>,
        quote_time: DateTime<Utc>,
    },
}

/// Market data and account source a strategy trades against
///
/// Implemented by the simulation context; a live backend can implement the
/// same trait.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Best quote at `time`
    async fn price_tick(&self, symbol: &str, time: DateTime<Utc>) -> Option<Tick>;
    /// Candles that have fully closed by the current time
    async fn rates(&self, symbol: &str, timeframe: Timeframe, window: Window) -> Vec<Candle>;
    /// Current account state
    async fn account_snapshot(&self) -> Account;
    /// Symbol properties
    async fn symbol_info(&self, symbol: &str) -> Option<SymbolMeta>;
}
