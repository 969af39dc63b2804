//! Trade record types

use crate::market::Tick;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position, order and deal identifier
pub type Ticket = u64;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// Price an order in this direction fills at
    pub fn entry_price(&self, quote: &Tick) -> Decimal {
        match self {
            Direction::Buy => quote.ask,
            Direction::Sell => quote.bid,
        }
    }

    /// Price a position in this direction is valued and closed at
    pub fn exit_price(&self, quote: &Tick) -> Decimal {
        match self {
            Direction::Buy => quote.bid,
            Direction::Sell => quote.ask,
        }
    }

    /// Signed contract-size profit
    pub fn profit(
        &self,
        volume: Decimal,
        contract_size: Decimal,
        open: Decimal,
        close: Decimal,
    ) -> Decimal {
        let gross = volume * contract_size * (close - open);
        match self {
            Direction::Buy => gross,
            Direction::Sell => -gross,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("buy"),
            Direction::Sell => f.write_str("sell"),
        }
    }
}

/// Whether a deal opened or closed a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealEntry {
    In,
    Out,
}

/// Terminal state of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Closed by an opposite deal from a strategy
    Explicit,
    /// Stop-loss or take-profit hit during settlement
    StopLossTakeProfit,
    /// Forced close on margin stop-out
    StopOut,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Explicit => "explicit",
            CloseReason::StopLossTakeProfit => "sl_tp",
            CloseReason::StopOut => "stop_out",
        }
    }
}

/// An open (or once-open) position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub price_current: Decimal,
    /// Stop-loss, zero when unset
    pub sl: Decimal,
    /// Take-profit, zero when unset
    pub tp: Decimal,
    /// Floating profit at `price_current`
    pub profit: Decimal,
    pub time_open: DateTime<Utc>,
    pub time_update: DateTime<Utc>,
    pub comment: String,
}

impl Position {
    /// Copy repriced at `price` with the given profit
    pub fn with_quote(&self, price: Decimal, profit: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            price_current: price,
            profit,
            time_update: time,
            ..self.clone()
        }
    }

    /// Copy with new stops
    pub fn with_stops(&self, sl: Decimal, tp: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            sl,
            tp,
            time_update: time,
            ..self.clone()
        }
    }

    /// True if the quote breaches the stop-loss or take-profit
    pub fn stops_hit(&self, quote: &Tick) -> bool {
        let price = self.direction.exit_price(quote);
        match self.direction {
            Direction::Buy => {
                (!self.sl.is_zero() && price <= self.sl) || (!self.tp.is_zero() && price >= self.tp)
            }
            Direction::Sell => {
                (!self.sl.is_zero() && price >= self.sl) || (!self.tp.is_zero() && price <= self.tp)
            }
        }
    }
}

/// A position after it left the open set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedPosition {
    /// Final state; `profit` holds the realized profit
    pub position: Position,
    pub reason: CloseReason,
    pub time_close: DateTime<Utc>,
    pub price_close: Decimal,
}

/// Instruction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub ticket: Ticket,
    pub position_id: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    pub price: Decimal,
    pub sl: Decimal,
    pub tp: Decimal,
    pub time_setup: DateTime<Utc>,
    pub time_done: DateTime<Utc>,
    pub comment: String,
}

/// Executed fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub ticket: Ticket,
    pub order: Ticket,
    pub position_id: Ticket,
    pub symbol: String,
    pub direction: Direction,
    pub entry: DealEntry,
    pub volume: Decimal,
    pub price: Decimal,
    pub time: DateTime<Utc>,
    /// Realized profit, zero for entry deals
    pub profit: Decimal,
}
