//! Order validation and execution

use super::account::Account;
use super::request::{CheckResult, RetCode, SendResult, TradeAction, TradeRequest};
use crate::ledger::{
    CloseReason, ClosedPosition, Deal, DealEntry, Direction, Order, Position, Ticket, TradeLedger,
};
use crate::market::{MarketDataStore, SymbolMeta, Tick};
use crate::telemetry;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Validation failure carried back to the caller as a result code
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rejection {
    code: RetCode,
    comment: String,
}

impl Rejection {
    fn new(code: RetCode, comment: impl Into<String>) -> Self {
        Self {
            code,
            comment: comment.into(),
        }
    }
}

/// What an accepted request will do
#[derive(Debug, Clone)]
enum Plan {
    Open {
        quote: Tick,
        price: Decimal,
        margin: Decimal,
        profit: Decimal,
    },
    Close {
        position: Position,
        quote: Tick,
        price: Decimal,
        profit: Decimal,
    },
    Modify {
        position: Position,
        quote: Tick,
    },
}

/// Account figures after a planned request
#[derive(Debug, Clone, Copy)]
struct Projection {
    balance: Decimal,
    profit: Decimal,
    margin: Decimal,
}

/// Simulated broker: account plus trade ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimBroker {
    account: Account,
    ledger: TradeLedger,
}

impl SimBroker {
    /// Broker with an empty ledger
    pub fn new(account: Account) -> Self {
        Self::from_parts(account, TradeLedger::new())
    }

    /// Broker resumed from a saved account and ledger
    pub fn from_parts(account: Account, ledger: TradeLedger) -> Self {
        let mut broker = Self { account, ledger };
        broker.refresh_account();
        broker
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn ledger(&self) -> &TradeLedger {
        &self.ledger
    }

    pub fn into_parts(self) -> (Account, TradeLedger) {
        (self.account, self.ledger)
    }

    /// Re-derive account aggregates from the open positions
    pub fn refresh_account(&mut self) {
        self.account
            .recompute(self.ledger.floating_profit(), self.ledger.total_margin());
    }

    /// Margin reserved for `volume` lots filled at `price`
    pub fn required_margin(&self, meta: &SymbolMeta, volume: Decimal, price: Decimal) -> Decimal {
        if self.account.leverage.is_zero() {
            return volume * meta.contract_size * price * meta.margin_rate;
        }
        volume * meta.contract_size * price * meta.margin_rate / self.account.leverage
    }

    /// Validate a request without changing any state
    pub fn order_check(
        &self,
        store: &MarketDataStore,
        request: &TradeRequest,
        now: DateTime<Utc>,
    ) -> CheckResult {
        match self.evaluate(store, request, now) {
            Ok((_, projection)) => self.check_result(RetCode::Ok, "Done", projection),
            Err(rejection) => {
                let current = self.current_projection();
                self.check_result(rejection.code, rejection.comment, current)
            }
        }
    }

    /// Validate and execute a request
    pub fn order_send(
        &mut self,
        store: &MarketDataStore,
        request: &TradeRequest,
        now: DateTime<Utc>,
    ) -> SendResult {
        let result = match self.evaluate(store, request, now) {
            Ok((plan, _)) => self.execute(request, plan, now),
            Err(rejection) => {
                tracing::debug!(
                    symbol = %request.symbol,
                    code = rejection.code.code(),
                    comment = %rejection.comment,
                    "Trade request rejected"
                );
                SendResult::rejected(rejection.code, rejection.comment)
            }
        };
        telemetry::record_request(result.code);
        result
    }

    fn execute(
        &mut self,
        request: &TradeRequest,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> SendResult {
        match plan {
            Plan::Open {
                quote,
                price,
                margin,
                profit,
            } => {
                let ticket = self.ledger.allocate_ticket();
                let position = Position {
                    ticket,
                    symbol: request.symbol.clone(),
                    direction: request.direction,
                    volume: request.volume,
                    price_open: price,
                    price_current: request.direction.exit_price(&quote),
                    sl: request.sl,
                    tp: request.tp,
                    profit,
                    time_open: now,
                    time_update: now,
                    comment: request.comment.clone(),
                };
                self.ledger.record_order(Order {
                    ticket,
                    position_id: ticket,
                    symbol: request.symbol.clone(),
                    direction: request.direction,
                    volume: request.volume,
                    price,
                    sl: request.sl,
                    tp: request.tp,
                    time_setup: now,
                    time_done: now,
                    comment: request.comment.clone(),
                });
                let deal = self.ledger.allocate_ticket();
                self.ledger.record_deal(Deal {
                    ticket: deal,
                    order: ticket,
                    position_id: ticket,
                    symbol: request.symbol.clone(),
                    direction: request.direction,
                    entry: DealEntry::In,
                    volume: request.volume,
                    price,
                    time: now,
                    profit: Decimal::ZERO,
                });
                self.ledger.open_position(position, margin);
                self.refresh_account();

                tracing::info!(
                    ticket,
                    symbol = %request.symbol,
                    direction = %request.direction,
                    volume = %request.volume,
                    price = %price,
                    margin = %margin,
                    "Position opened"
                );

                self.done(ticket, deal, ticket, request.volume, price, &quote)
            }
            Plan::Close {
                position,
                quote,
                price,
                profit,
            } => {
                let (order, deal) = self.close_at(
                    &position,
                    price,
                    profit,
                    now,
                    CloseReason::Explicit,
                    &request.comment,
                );
                self.done(order, deal, position.ticket, position.volume, price, &quote)
            }
            Plan::Modify { position, quote } => {
                self.ledger.update_position(position.ticket, |p| {
                    p.with_stops(request.sl, request.tp, now)
                });

                tracing::info!(
                    ticket = position.ticket,
                    sl = %request.sl,
                    tp = %request.tp,
                    "Position stops modified"
                );

                SendResult {
                    code: RetCode::Done,
                    comment: RetCode::Done.description().to_string(),
                    order: None,
                    deal: None,
                    position: Some(position.ticket),
                    volume: position.volume,
                    price: Decimal::ZERO,
                    bid: quote.bid,
                    ask: quote.ask,
                }
            }
        }
    }

    /// Close an open position at `price` with an opposite order and an exit deal
    ///
    /// Realized profit is rounded to account precision and booked into the
    /// balance. Returns the order and deal tickets.
    pub(super) fn close_at(
        &mut self,
        position: &Position,
        price: Decimal,
        profit: Decimal,
        now: DateTime<Utc>,
        reason: CloseReason,
        comment: &str,
    ) -> (Ticket, Ticket) {
        let booked = self.account.realize(profit);
        let direction = position.direction.opposite();

        let order = self.ledger.allocate_ticket();
        self.ledger.record_order(Order {
            ticket: order,
            position_id: position.ticket,
            symbol: position.symbol.clone(),
            direction,
            volume: position.volume,
            price,
            sl: Decimal::ZERO,
            tp: Decimal::ZERO,
            time_setup: now,
            time_done: now,
            comment: comment.to_string(),
        });
        let deal = self.ledger.allocate_ticket();
        self.ledger.record_deal(Deal {
            ticket: deal,
            order,
            position_id: position.ticket,
            symbol: position.symbol.clone(),
            direction,
            entry: DealEntry::Out,
            volume: position.volume,
            price,
            time: now,
            profit: booked,
        });
        self.ledger
            .close_position(position.ticket, reason, now, price, booked);
        self.refresh_account();

        tracing::info!(
            ticket = position.ticket,
            symbol = %position.symbol,
            reason = reason.as_str(),
            price = %price,
            profit = %booked,
            balance = %self.account.balance,
            "Position closed"
        );
        telemetry::record_close(reason);

        (order, deal)
    }

    /// Reprice an open position, returning the updated row
    pub(super) fn reprice(
        &mut self,
        ticket: Ticket,
        price: Decimal,
        profit: Decimal,
        now: DateTime<Utc>,
    ) -> Option<&Position> {
        self.ledger
            .update_position(ticket, |p| p.with_quote(price, profit, now))
    }

    /// Closed row for a ticket, if it has left the open set
    pub fn closed_position(&self, ticket: Ticket) -> Option<&ClosedPosition> {
        self.ledger.closed_position(ticket)
    }

    /// Floating profit of a position at `price`, rounded to account precision
    pub(super) fn floating_profit(
        &self,
        position: &Position,
        meta: &SymbolMeta,
        price: Decimal,
    ) -> Decimal {
        self.account.round(position.direction.profit(
            position.volume,
            meta.contract_size,
            position.price_open,
            price,
        ))
    }

    fn done(
        &self,
        order: Ticket,
        deal: Ticket,
        position: Ticket,
        volume: Decimal,
        price: Decimal,
        quote: &Tick,
    ) -> SendResult {
        SendResult {
            code: RetCode::Done,
            comment: RetCode::Done.description().to_string(),
            order: Some(order),
            deal: Some(deal),
            position: Some(position),
            volume,
            price,
            bid: quote.bid,
            ask: quote.ask,
        }
    }

    fn current_projection(&self) -> Projection {
        Projection {
            balance: self.account.balance,
            profit: self.ledger.floating_profit(),
            margin: self.ledger.total_margin(),
        }
    }

    fn check_result(
        &self,
        code: RetCode,
        comment: impl Into<String>,
        projection: Projection,
    ) -> CheckResult {
        let equity = projection.balance + projection.profit;
        CheckResult {
            code,
            comment: comment.into(),
            balance: projection.balance,
            equity,
            profit: projection.profit,
            margin: projection.margin,
            margin_free: equity - projection.margin,
            margin_level: self.account.level_for(equity, projection.margin),
        }
    }

    /// Run every validation and work out the post-trade account
    fn evaluate(
        &self,
        store: &MarketDataStore,
        request: &TradeRequest,
        now: DateTime<Utc>,
    ) -> Result<(Plan, Projection), Rejection> {
        let meta = store.symbol_info(&request.symbol).map_err(|e| {
            Rejection::new(RetCode::InvalidRequest, e.to_string())
        })?;

        let target = match request.position {
            Some(ticket) => Some(self.open_target(ticket, request)?),
            None => None,
        };

        let quote = store
            .price_tick(&request.symbol, now)
            .map_err(|e| Rejection::new(RetCode::PriceOff, e.to_string()))?;

        let current = self.current_projection();

        match (request.action, target) {
            (TradeAction::Sltp, Some(position)) => {
                check_stops(meta, position.direction, &quote, request.sl, request.tp)?;
                Ok((Plan::Modify { position, quote }, current))
            }
            (TradeAction::Deal, Some(position)) => {
                if request.direction != position.direction.opposite() {
                    return Err(Rejection::new(
                        RetCode::InvalidRequest,
                        format!("Closing #{} requires an opposite deal", position.ticket),
                    ));
                }
                if request.volume != position.volume {
                    return Err(Rejection::new(
                        RetCode::InvalidVolume,
                        format!(
                            "Close volume {} differs from position volume {}",
                            request.volume, position.volume
                        ),
                    ));
                }
                let price = position.direction.exit_price(&quote);
                let profit = self.floating_profit(&position, meta, price);
                let margin = self.ledger.margin(position.ticket).unwrap_or_default();
                let projection = Projection {
                    balance: current.balance + self.account.round(profit),
                    profit: current.profit - position.profit,
                    margin: current.margin - margin,
                };
                Ok((
                    Plan::Close {
                        position,
                        quote,
                        price,
                        profit,
                    },
                    projection,
                ))
            }
            (TradeAction::Sltp, None) => Err(Rejection::new(
                RetCode::InvalidRequest,
                "Stop modification requires a position",
            )),
            (TradeAction::Deal, None) => {
                if request.volume <= Decimal::ZERO || !meta.volume_ok(request.volume) {
                    return Err(Rejection::new(
                        RetCode::InvalidVolume,
                        format!(
                            "Volume {} outside [{}, {}] step {}",
                            request.volume, meta.volume_min, meta.volume_max, meta.volume_step
                        ),
                    ));
                }
                check_stops(meta, request.direction, &quote, request.sl, request.tp)?;

                let price = request.direction.entry_price(&quote);
                let margin = self.required_margin(meta, request.volume, price);
                let profit = self.account.round(request.direction.profit(
                    request.volume,
                    meta.contract_size,
                    price,
                    request.direction.exit_price(&quote),
                ));
                let projection = Projection {
                    balance: current.balance,
                    profit: current.profit + profit,
                    margin: current.margin + margin,
                };

                let equity = projection.balance + projection.profit;
                if equity - projection.margin < Decimal::ZERO
                    || self.account.breaches(equity, projection.margin)
                {
                    return Err(Rejection::new(
                        RetCode::NoMoney,
                        format!(
                            "Margin {} exceeds free margin {}",
                            margin,
                            self.account.equity - current.margin
                        ),
                    ));
                }

                Ok((
                    Plan::Open {
                        quote,
                        price,
                        margin,
                        profit,
                    },
                    projection,
                ))
            }
        }
    }

    /// Open position a close or modification refers to
    fn open_target(&self, ticket: Ticket, request: &TradeRequest) -> Result<Position, Rejection> {
        match self.ledger.open_position_by_ticket(ticket) {
            Some(position) if position.symbol == request.symbol => Ok(position.clone()),
            Some(position) => Err(Rejection::new(
                RetCode::InvalidRequest,
                format!("Position #{} is on {}", ticket, position.symbol),
            )),
            None if self.ledger.closed_position(ticket).is_some() => Err(Rejection::new(
                RetCode::PositionClosed,
                format!("Position #{} already closed", ticket),
            )),
            None => Err(Rejection::new(
                RetCode::InvalidRequest,
                format!("Position #{} not found", ticket),
            )),
        }
    }
}

/// Stop side and distance rules
///
/// Long: `sl < bid < tp`, short: `tp < ask < sl`, each stop at least
/// `stops_level` plus the current spread away in points. Zero means unset.
fn check_stops(
    meta: &SymbolMeta,
    direction: Direction,
    quote: &Tick,
    sl: Decimal,
    tp: Decimal,
) -> Result<(), Rejection> {
    if sl < Decimal::ZERO || tp < Decimal::ZERO {
        return Err(Rejection::new(RetCode::InvalidStops, "Negative stop price"));
    }

    let reference = direction.exit_price(quote);
    let min_points = Decimal::from(meta.stops_level) + meta.to_points(quote.spread());

    let wrong_side = match direction {
        Direction::Buy => (!sl.is_zero() && sl >= reference) || (!tp.is_zero() && tp <= reference),
        Direction::Sell => (!sl.is_zero() && sl <= reference) || (!tp.is_zero() && tp >= reference),
    };
    if wrong_side {
        return Err(Rejection::new(
            RetCode::InvalidStops,
            format!("Stops sl={} tp={} on wrong side of {}", sl, tp, reference),
        ));
    }

    for stop in [sl, tp] {
        if stop.is_zero() {
            continue;
        }
        let distance = meta.to_points((stop - reference).abs());
        if distance < min_points {
            return Err(Rejection::new(
                RetCode::InvalidStops,
                format!(
                    "Stop {} is {} points from {}, minimum {}",
                    stop, distance, reference, min_points
                ),
            ));
        }
    }

    Ok(())
}
