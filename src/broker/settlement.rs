//! Per-round settlement pass

use super::engine::SimBroker;
use crate::ledger::{CloseReason, PositionFilter, Ticket};
use crate::market::MarketDataStore;
use crate::telemetry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What one settlement pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub time: Option<DateTime<Utc>>,
    /// Positions repriced and kept open
    pub repriced: usize,
    /// Positions left untouched for lack of a quote
    pub skipped: Vec<Ticket>,
    pub closed_sl_tp: Vec<Ticket>,
    pub stopped_out: Vec<Ticket>,
}

impl SettlementReport {
    /// True if any position left the open set
    pub fn closed_any(&self) -> bool {
        !self.closed_sl_tp.is_empty() || !self.stopped_out.is_empty()
    }
}

impl SimBroker {
    /// Reprice every open position at `now`, fire stops, then enforce stop-out
    ///
    /// A position without a usable quote keeps its last price and is reported
    /// in `skipped`; the others are still processed.
    pub fn settle(&mut self, store: &MarketDataStore, now: DateTime<Utc>) -> SettlementReport {
        let mut report = SettlementReport {
            time: Some(now),
            ..Default::default()
        };

        for ticket in self.ledger().open_tickets() {
            let Some(position) = self.ledger().open_position_by_ticket(ticket).cloned() else {
                continue;
            };

            let priced = store.symbol_info(&position.symbol).and_then(|meta| {
                store
                    .price_tick(&position.symbol, now)
                    .map(|quote| (meta, quote))
            });
            let (meta, quote) = match priced {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(ticket, error = %e, "Skipping position without quote");
                    report.skipped.push(ticket);
                    continue;
                }
            };

            let price = position.direction.exit_price(&quote);
            let profit = self.floating_profit(&position, meta, price);

            if position.stops_hit(&quote) {
                self.close_at(
                    &position,
                    price,
                    profit,
                    now,
                    CloseReason::StopLossTakeProfit,
                    "sl/tp",
                );
                report.closed_sl_tp.push(ticket);
            } else {
                self.reprice(ticket, price, profit, now);
                report.repriced += 1;
            }
        }

        self.refresh_account();
        self.stop_out(now, &mut report);

        telemetry::record_account(self.account(), self.ledger().positions_total());
        report
    }

    /// Close the worst position until the account is out of stop-out
    ///
    /// Worst is the lowest floating profit, ties going to the lowest ticket.
    /// Victims close at their last price.
    fn stop_out(&mut self, now: DateTime<Utc>, report: &mut SettlementReport) {
        while self.account().stop_out_breached() {
            let victim = self
                .ledger()
                .positions(&PositionFilter::all())
                .into_iter()
                .min_by(|a, b| a.profit.cmp(&b.profit).then(a.ticket.cmp(&b.ticket)))
                .cloned();
            let Some(victim) = victim else {
                break;
            };

            tracing::warn!(
                ticket = victim.ticket,
                equity = %self.account().equity,
                margin = %self.account().margin,
                margin_level = %self.account().margin_level,
                "Stop-out"
            );

            self.close_at(
                &victim,
                victim.price_current,
                victim.profit,
                now,
                CloseReason::StopOut,
                "stop out",
            );
            report.stopped_out.push(victim.ticket);
        }
    }
}
