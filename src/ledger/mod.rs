//! Trade ledger module
//!
//! Positions, orders, deals and per-ticket margin reservations

mod book;
mod types;

pub use book::TradeLedger;
pub use types::{
    CloseReason, ClosedPosition, Deal, DealEntry, Direction, Order, Position, Ticket,
};

use chrono::{DateTime, Utc};

/// Selects open positions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionFilter {
    pub symbol: Option<String>,
    pub ticket: Option<Ticket>,
    /// Comma-separated `*` patterns; a leading `!` excludes
    pub group: Option<String>,
}

impl PositionFilter {
    /// Match every open position
    pub fn all() -> Self {
        Self::default()
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn matches(&self, position: &Position) -> bool {
        if let Some(ticket) = self.ticket {
            if position.ticket != ticket {
                return false;
            }
        }
        if let Some(ref symbol) = self.symbol {
            if &position.symbol != symbol {
                return false;
            }
        }
        match self.group {
            Some(ref group) => group_matches(group, &position.symbol),
            None => true,
        }
    }
}

/// Selects history orders and deals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub ticket: Option<Ticket>,
    pub position: Option<Ticket>,
}

impl HistoryFilter {
    /// Records with `from <= time <= to`
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn ticket(mut self, ticket: Ticket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn position(mut self, position: Ticket) -> Self {
        self.position = Some(position);
        self
    }

    pub fn matches(&self, ticket: Ticket, position_id: Ticket, time: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| time >= from)
            && self.to.map_or(true, |to| time <= to)
            && self.ticket.map_or(true, |t| t == ticket)
            && self.position.map_or(true, |p| p == position_id)
    }
}

/// Match a symbol against a group expression such as `"*USD*,!EURUSD"`
pub fn group_matches(group: &str, symbol: &str) -> bool {
    let mut included = false;
    let mut has_positive = false;

    for pattern in group.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(excluded) = pattern.strip_prefix('!') {
            if wildcard_match(excluded, symbol) {
                return false;
            }
        } else {
            has_positive = true;
            included |= wildcard_match(pattern, symbol);
        }
    }

    included || !has_positive
}

/// Case-insensitive match where `*` spans any run of characters
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_ascii_uppercase().chars().collect();
    let text: Vec<char> = text.to_ascii_uppercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("EURUSD", "eurusd"));
        assert!(wildcard_match("*USD", "EURUSD"));
        assert!(wildcard_match("EUR*", "EURUSD"));
        assert!(wildcard_match("*", "XAUUSD"));
        assert!(wildcard_match("*US*", "EURUSD"));
        assert!(!wildcard_match("*JPY", "EURUSD"));
        assert!(!wildcard_match("EUR", "EURUSD"));
    }

    #[test]
    fn test_group_exclusions() {
        assert!(group_matches("*USD*", "GBPUSD"));
        assert!(!group_matches("*USD*,!GBP*", "GBPUSD"));
        assert!(group_matches("!GBP*", "EURUSD"));
        assert!(!group_matches("EUR*,XAU*", "GBPUSD"));
        assert!(group_matches("EUR*, XAU*", "XAUUSD"));
    }

    #[test]
    fn test_history_filter_inclusive_bounds() {
        let now = Utc::now();
        let filter = HistoryFilter::between(now, now + Duration::minutes(1));
        assert!(filter.matches(1, 1, now));
        assert!(filter.matches(1, 1, now + Duration::minutes(1)));
        assert!(!filter.matches(1, 1, now + Duration::minutes(2)));
        assert!(!filter.clone().ticket(2).matches(1, 1, now));
        assert!(filter.position(1).matches(5, 1, now));
    }
}
