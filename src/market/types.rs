//! Market data types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anything stored in a time-ordered series
pub trait Timestamped {
    fn time(&self) -> DateTime<Utc>;
}

/// A timestamped quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub volume: Decimal,
}

impl Tick {
    /// Spread in price units
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

impl Timestamped for Tick {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// An OHLC bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub tick_volume: u64,
    /// Spread in points
    pub spread: u32,
    pub real_volume: u64,
}

impl Timestamped for Candle {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// A point of the canonical price series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub price: Decimal,
}

impl Timestamped for PricePoint {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Candle timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    /// Bar length
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            "W1" => Ok(Timeframe::W1),
            other => Err(format!("unknown timeframe: {}", other)),
        }
    }
}

/// Static trading properties of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolMeta {
    /// Symbol name (e.g., "EURUSD")
    pub name: String,
    /// Price digits after the decimal point
    pub digits: u32,
    /// Smallest price change
    pub point: Decimal,
    /// Units per lot
    pub contract_size: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
    /// Minimum stop distance in points
    pub stops_level: u32,
    /// Initial margin rate multiplier
    pub margin_rate: Decimal,
    /// Currency profit is expressed in
    pub currency_profit: String,
}

impl SymbolMeta {
    /// Convert a price distance into points
    pub fn to_points(&self, distance: Decimal) -> Decimal {
        if self.point.is_zero() {
            return Decimal::ZERO;
        }
        distance / self.point
    }

    /// Check volume against min/max/step
    pub fn volume_ok(&self, volume: Decimal) -> bool {
        if volume < self.volume_min || volume > self.volume_max {
            return false;
        }
        if self.volume_step.is_zero() {
            return true;
        }
        ((volume - self.volume_min) % self.volume_step).is_zero()
    }
}

/// Which slice of a series to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// `count` items ending `offset` items before the newest visible one
    Latest { offset: usize, count: usize },
    /// `count` items at or before `time`
    From { time: DateTime<Utc>, count: usize },
    /// Items with `from <= time <= to`
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}
