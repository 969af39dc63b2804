//! Trade ledger: open positions, reserved margins and append-only history

use super::types::{CloseReason, ClosedPosition, Deal, Order, Position, Ticket};
use super::{HistoryFilter, PositionFilter};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Owns every position, order and deal of a simulation
///
/// Orders and deals are append-only and ordered by ticket. Open positions
/// carry a reserved margin; closed positions keep their final state for
/// history lookups but leave the margin map and the open aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLedger {
    next_ticket: Ticket,
    open: BTreeMap<Ticket, Position>,
    margins: BTreeMap<Ticket, Decimal>,
    closed: BTreeMap<Ticket, ClosedPosition>,
    orders: Vec<Order>,
    deals: Vec<Deal>,
}

impl TradeLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unique ticket
    pub fn allocate_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Add a freshly opened position with its reserved margin
    pub fn open_position(&mut self, position: Position, margin: Decimal) {
        self.margins.insert(position.ticket, margin);
        self.open.insert(position.ticket, position);
    }

    /// Move a position out of the open set
    ///
    /// Releases its margin and records the realized profit on the retained copy.
    pub fn close_position(
        &mut self,
        ticket: Ticket,
        reason: CloseReason,
        time: DateTime<Utc>,
        price: Decimal,
        profit: Decimal,
    ) -> Option<&ClosedPosition> {
        let position = self.open.remove(&ticket)?;
        self.margins.remove(&ticket);

        let closed = ClosedPosition {
            position: position.with_quote(price, profit, time),
            reason,
            time_close: time,
            price_close: price,
        };
        self.closed.insert(ticket, closed);
        self.closed.get(&ticket)
    }

    /// Replace an open position with an updated copy
    ///
    /// The closure receives the current row and returns its replacement;
    /// the ticket cannot change.
    pub fn update_position<F>(&mut self, ticket: Ticket, update: F) -> Option<&Position>
    where
        F: FnOnce(&Position) -> Position,
    {
        let current = self.open.get_mut(&ticket)?;
        let mut next = update(current);
        next.ticket = ticket;
        *current = next;
        Some(&*current)
    }

    pub fn record_order(&mut self, order: Order) {
        self.orders.push(order);
    }

    pub fn record_deal(&mut self, deal: Deal) {
        self.deals.push(deal);
    }

    /// Open position by ticket
    pub fn open_position_by_ticket(&self, ticket: Ticket) -> Option<&Position> {
        self.open.get(&ticket)
    }

    /// Any position by ticket, open or closed
    pub fn position(&self, ticket: Ticket) -> Option<&Position> {
        self.open
            .get(&ticket)
            .or_else(|| self.closed.get(&ticket).map(|c| &c.position))
    }

    pub fn closed_position(&self, ticket: Ticket) -> Option<&ClosedPosition> {
        self.closed.get(&ticket)
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &ClosedPosition> {
        self.closed.values()
    }

    /// Open positions matching the filter, in ticket order
    pub fn positions(&self, filter: &PositionFilter) -> Vec<&Position> {
        self.open.values().filter(|p| filter.matches(p)).collect()
    }

    pub fn positions_total(&self) -> usize {
        self.open.len()
    }

    pub fn open_tickets(&self) -> Vec<Ticket> {
        self.open.keys().copied().collect()
    }

    pub fn order(&self, ticket: Ticket) -> Option<&Order> {
        self.orders
            .binary_search_by_key(&ticket, |o| o.ticket)
            .ok()
            .map(|i| &self.orders[i])
    }

    pub fn deal(&self, ticket: Ticket) -> Option<&Deal> {
        self.deals
            .binary_search_by_key(&ticket, |d| d.ticket)
            .ok()
            .map(|i| &self.deals[i])
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    /// Orders completed inside the filter's range
    pub fn history_orders(&self, filter: &HistoryFilter) -> Vec<&Order> {
        self.orders
            .iter()
            .filter(|o| filter.matches(o.ticket, o.position_id, o.time_done))
            .collect()
    }

    /// Deals executed inside the filter's range
    pub fn history_deals(&self, filter: &HistoryFilter) -> Vec<&Deal> {
        self.deals
            .iter()
            .filter(|d| filter.matches(d.ticket, d.position_id, d.time))
            .collect()
    }

    /// Margin reserved for an open position
    pub fn margin(&self, ticket: Ticket) -> Option<Decimal> {
        self.margins.get(&ticket).copied()
    }

    /// Sum of reserved margins
    pub fn total_margin(&self) -> Decimal {
        self.margins.values().copied().sum()
    }

    /// Sum of floating profit over open positions
    pub fn floating_profit(&self) -> Decimal {
        self.open.values().map(|p| p.profit).sum()
    }

    /// Check internal consistency after loading from disk
    pub fn is_consistent(&self) -> bool {
        let margins_match = self.open.len() == self.margins.len()
            && self.open.keys().all(|t| self.margins.contains_key(t));
        let disjoint = self.open.keys().all(|t| !self.closed.contains_key(t));
        let max_ticket = self
            .orders
            .iter()
            .map(|o| o.ticket)
            .chain(self.deals.iter().map(|d| d.ticket))
            .max()
            .unwrap_or(0);
        let ordered = self.orders.windows(2).all(|w| w[0].ticket < w[1].ticket)
            && self.deals.windows(2).all(|w| w[0].ticket < w[1].ticket);
        margins_match && disjoint && ordered && max_ticket <= self.next_ticket
    }
}
