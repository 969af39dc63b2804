//! Historical market data store

use super::series::Series;
use super::types::{Candle, PricePoint, SymbolMeta, Tick, Timeframe, Window};
use super::DataError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything stored for one symbol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSeries {
    pub ticks: Series<Tick>,
    pub rates: BTreeMap<Timeframe, Series<Candle>>,
    pub prices: Series<PricePoint>,
}

/// Indexed historical series per symbol
///
/// Pure lookup once loaded; history queries take an `as_of` time and never
/// return anything stamped at or after it.
#[derive(Debug, Clone, Default)]
pub struct MarketDataStore {
    symbols: BTreeMap<String, SymbolMeta>,
    series: BTreeMap<String, SymbolSeries>,
    max_quote_age: Option<Duration>,
}

impl MarketDataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat quotes older than `age` as missing
    pub fn with_max_quote_age(mut self, age: Option<Duration>) -> Self {
        self.max_quote_age = age;
        self
    }

    pub fn max_quote_age(&self) -> Option<Duration> {
        self.max_quote_age
    }

    /// Register a symbol; replaces existing metadata
    pub fn insert_symbol(&mut self, meta: SymbolMeta) {
        self.series.entry(meta.name.clone()).or_default();
        self.symbols.insert(meta.name.clone(), meta);
    }

    fn series_mut(&mut self, symbol: &str) -> Result<&mut SymbolSeries, DataError> {
        if !self.symbols.contains_key(symbol) {
            return Err(DataError::UnknownSymbol(symbol.to_string()));
        }
        Ok(self.series.entry(symbol.to_string()).or_default())
    }

    fn series(&self, symbol: &str) -> Result<&SymbolSeries, DataError> {
        self.series
            .get(symbol)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))
    }

    pub fn insert_ticks(&mut self, symbol: &str, ticks: Vec<Tick>) -> Result<(), DataError> {
        self.series_mut(symbol)?.ticks.extend(ticks);
        Ok(())
    }

    pub fn insert_rates(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<(), DataError> {
        self.series_mut(symbol)?
            .rates
            .entry(timeframe)
            .or_default()
            .extend(candles);
        Ok(())
    }

    pub fn insert_prices(&mut self, symbol: &str, prices: Vec<PricePoint>) -> Result<(), DataError> {
        self.series_mut(symbol)?.prices.extend(prices);
        Ok(())
    }

    /// Replace all series of a symbol at once
    pub fn insert_series(&mut self, symbol: &str, series: SymbolSeries) -> Result<(), DataError> {
        *self.series_mut(symbol)? = series;
        Ok(())
    }

    pub fn symbol_info(&self, symbol: &str) -> Result<&SymbolMeta, DataError> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolMeta> {
        self.symbols.values()
    }

    pub fn all_series(&self) -> impl Iterator<Item = (&String, &SymbolSeries)> {
        self.series.iter()
    }

    /// Best quote at `time`: the latest tick at or before it
    ///
    /// Falls back to the canonical price series (bid = ask = price) when the
    /// symbol has no ticks.
    pub fn price_tick(&self, symbol: &str, time: DateTime<Utc>) -> Result<Tick, DataError> {
        let series = self.series(symbol)?;

        let quote = if series.ticks.is_empty() {
            series.prices.at_or_before(time).map(|p| Tick {
                time: p.time,
                bid: p.price,
                ask: p.price,
                last: p.price,
                volume: rust_decimal::Decimal::ZERO,
            })
        } else {
            series.ticks.at_or_before(time).cloned()
        };

        let quote = quote.ok_or_else(|| DataError::NoQuote {
            symbol: symbol.to_string(),
            time,
        })?;

        if let Some(max_age) = self.max_quote_age {
            if time - quote.time > max_age {
                return Err(DataError::StaleQuote {
                    symbol: symbol.to_string(),
                    time,
                    quote_time: quote.time,
                });
            }
        }

        Ok(quote)
    }

    /// Candles that have closed by `as_of`, selected by `window`
    ///
    /// A bar stamped `t` covers `[t, t + timeframe)`; it becomes visible
    /// once that interval has fully elapsed.
    pub fn rates(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        window: Window,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Candle>, DataError> {
        let series = self.series(symbol)?;
        Ok(series
            .rates
            .get(&timeframe)
            .map(|s| s.window_through(window, as_of - timeframe.duration()).to_vec())
            .unwrap_or_default())
    }

    /// Ticks strictly before `as_of`, selected by `window`
    pub fn ticks(
        &self,
        symbol: &str,
        window: Window,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Tick>, DataError> {
        Ok(self.series(symbol)?.ticks.window(window, as_of).to_vec())
    }
}
