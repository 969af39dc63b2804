//! Trading account state

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How the stop-out threshold is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopOutMode {
    /// Threshold is a margin level percentage (equity / margin * 100)
    #[default]
    Percent,
    /// Threshold is an amount of free margin
    Money,
}

/// Account balances and margin figures
///
/// Invariants after every `recompute`: `equity = balance + profit`,
/// `margin_free = equity - margin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    pub equity: Decimal,
    /// Floating profit of open positions
    pub profit: Decimal,
    pub margin: Decimal,
    pub margin_free: Decimal,
    /// `equity / margin * 100` in either stop-out mode; `Decimal::MAX` with no margin
    pub margin_level: Decimal,
    pub leverage: Decimal,
    pub currency_digits: u32,
    pub stop_out_mode: StopOutMode,
    pub stop_out_threshold: Decimal,
}

impl Account {
    /// Create a flat account holding `balance`
    pub fn new(
        balance: Decimal,
        leverage: Decimal,
        currency_digits: u32,
        stop_out_mode: StopOutMode,
        stop_out_threshold: Decimal,
    ) -> Self {
        let mut account = Self {
            balance,
            equity: balance,
            profit: Decimal::ZERO,
            margin: Decimal::ZERO,
            margin_free: balance,
            margin_level: Decimal::ZERO,
            leverage,
            currency_digits,
            stop_out_mode,
            stop_out_threshold,
        };
        account.recompute(Decimal::ZERO, Decimal::ZERO);
        account
    }

    /// Re-derive equity, free margin and margin level
    pub fn recompute(&mut self, profit: Decimal, margin: Decimal) {
        self.profit = profit;
        self.margin = margin;
        self.equity = self.balance + profit;
        self.margin_free = self.equity - margin;
        self.margin_level = self.level_for(self.equity, margin);
    }

    /// Percent margin level for a hypothetical equity/margin pair
    pub fn level_for(&self, equity: Decimal, margin: Decimal) -> Decimal {
        if margin.is_zero() {
            return Decimal::MAX;
        }
        equity / margin * dec!(100)
    }

    /// True if `equity`/`margin` would sit at or below the stop-out threshold
    pub fn breaches(&self, equity: Decimal, margin: Decimal) -> bool {
        if margin.is_zero() {
            return false;
        }
        match self.stop_out_mode {
            StopOutMode::Percent => self.level_for(equity, margin) <= self.stop_out_threshold,
            StopOutMode::Money => equity - margin <= self.stop_out_threshold,
        }
    }

    /// True if the current state is at or below the stop-out threshold
    pub fn stop_out_breached(&self) -> bool {
        self.breaches(self.equity, self.margin)
    }

    /// Round an amount to account currency precision
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp(self.currency_digits)
    }

    /// Book realized profit into the balance, returning the booked amount
    pub fn realize(&mut self, profit: Decimal) -> Decimal {
        let booked = self.round(profit);
        self.balance += booked;
        booked
    }
}
