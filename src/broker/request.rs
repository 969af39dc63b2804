//! Trade requests and broker responses

use crate::ledger::{Direction, Position, Ticket};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a request asks the broker to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    /// Market deal: opens a position, or closes `position` with an opposite deal
    Deal,
    /// Modify stop-loss / take-profit of an open position
    Sltp,
}

/// A request to the simulated broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub action: TradeAction,
    pub symbol: String,
    pub direction: Direction,
    pub volume: Decimal,
    /// Informational; market deals fill at the current best quote
    pub price: Option<Decimal>,
    pub sl: Decimal,
    pub tp: Decimal,
    /// Position to close or modify
    pub position: Option<Ticket>,
    pub comment: String,
}

impl TradeRequest {
    /// Open a new position at market
    pub fn market(symbol: impl Into<String>, direction: Direction, volume: Decimal) -> Self {
        Self {
            action: TradeAction::Deal,
            symbol: symbol.into(),
            direction,
            volume,
            price: None,
            sl: Decimal::ZERO,
            tp: Decimal::ZERO,
            position: None,
            comment: String::new(),
        }
    }

    /// Close an open position with an opposite deal of its full volume
    pub fn close(position: &Position) -> Self {
        Self {
            position: Some(position.ticket),
            ..Self::market(
                position.symbol.clone(),
                position.direction.opposite(),
                position.volume,
            )
        }
    }

    /// Replace the stops of an open position
    pub fn modify(position: &Position, sl: Decimal, tp: Decimal) -> Self {
        Self {
            action: TradeAction::Sltp,
            sl,
            tp,
            position: Some(position.ticket),
            ..Self::market(position.symbol.clone(), position.direction, position.volume)
        }
    }

    pub fn with_stops(mut self, sl: Decimal, tp: Decimal) -> Self {
        self.sl = sl;
        self.tp = tp;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetCode {
    /// Check passed
    Ok,
    /// Request executed
    Done,
    InvalidRequest,
    InvalidVolume,
    InvalidStops,
    NoMoney,
    /// No quote to price the request
    PriceOff,
    PositionClosed,
}

impl RetCode {
    /// Numeric status code
    pub fn code(&self) -> u32 {
        match self {
            RetCode::Ok => 0,
            RetCode::Done => 10009,
            RetCode::InvalidRequest => 10013,
            RetCode::InvalidVolume => 10014,
            RetCode::InvalidStops => 10016,
            RetCode::NoMoney => 10019,
            RetCode::PriceOff => 10021,
            RetCode::PositionClosed => 10036,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetCode::Ok | RetCode::Done)
    }

    pub fn description(&self) -> &'static str {
        match self {
            RetCode::Ok => "Done",
            RetCode::Done => "Request executed",
            RetCode::InvalidRequest => "Invalid request",
            RetCode::InvalidVolume => "Invalid volume in the request",
            RetCode::InvalidStops => "Invalid stops in the request",
            RetCode::NoMoney => "There is not enough money to complete the request",
            RetCode::PriceOff => "There are no quotes to process the request",
            RetCode::PositionClosed => "Position with the specified identifier has already been closed",
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Outcome of `order_check`, with the account as it would be after the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub code: RetCode,
    pub comment: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub profit: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    pub margin_level: Decimal,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.code == RetCode::Ok
    }
}

/// Outcome of `order_send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub code: RetCode,
    pub comment: String,
    pub order: Option<Ticket>,
    pub deal: Option<Ticket>,
    pub position: Option<Ticket>,
    pub volume: Decimal,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
}

impl SendResult {
    /// Rejection carrying only a code and comment
    pub fn rejected(code: RetCode, comment: impl Into<String>) -> Self {
        Self {
            code,
            comment: comment.into(),
            order: None,
            deal: None,
            position: None,
            volume: Decimal::ZERO,
            price: Decimal::ZERO,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    pub fn is_done(&self) -> bool {
        self.code == RetCode::Done
    }
}
