//! Simulation context: shared state plus the round barrier

use crate::broker::{Account, CheckResult, SendResult, SettlementReport, SimBroker, TradeRequest};
use crate::clock::{Cursor, SimClock};
use crate::ledger::{Deal, HistoryFilter, Order, Position, PositionFilter};
use crate::market::{
    Candle, MarketDataProvider, MarketDataStore, SymbolMeta, Tick, Timeframe, Window,
};
use crate::sync::{RoundOutcome, Settlement, Synchronizer};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Everything a round reads or mutates
#[derive(Debug, Clone)]
pub struct SimState {
    pub clock: SimClock,
    pub store: MarketDataStore,
    pub broker: SimBroker,
}

impl SimState {
    /// Settle the current step, then advance the clock
    pub fn settle_and_advance(&mut self) -> (SettlementReport, Option<Cursor>) {
        let now = self.clock.now();
        let report = self.broker.settle(&self.store, now);
        (report, self.clock.next())
    }
}

/// Settlement hook run by the barrier at the end of every round
pub struct RoundSettlement {
    state: Arc<RwLock<SimState>>,
}

#[async_trait]
impl Settlement for RoundSettlement {
    async fn settle(&self) -> RoundOutcome {
        let mut state = self.state.write().await;
        let (report, next) = state.settle_and_advance();

        tracing::debug!(
            time = ?report.time,
            repriced = report.repriced,
            skipped = report.skipped.len(),
            closed_sl_tp = report.closed_sl_tp.len(),
            stopped_out = report.stopped_out.len(),
            equity = %state.broker.account().equity,
            "Settlement pass"
        );

        match next {
            Some(cursor) => RoundOutcome::Advanced(cursor),
            None => {
                tracing::info!(time = %state.clock.now(), "Replay span finished");
                RoundOutcome::Finished
            }
        }
    }
}

/// One independent simulation
///
/// Strategy tasks share it through an `Arc`; several contexts can run in
/// the same process.
pub struct SimulationContext {
    state: Arc<RwLock<SimState>>,
    sync: Synchronizer<RoundSettlement>,
}

impl SimulationContext {
    pub fn new(clock: SimClock, store: MarketDataStore, broker: SimBroker) -> Self {
        let state = Arc::new(RwLock::new(SimState {
            clock,
            store,
            broker,
        }));
        let sync = Synchronizer::new(RoundSettlement {
            state: state.clone(),
        });
        Self { state, sync }
    }

    pub fn sync(&self) -> &Synchronizer<RoundSettlement> {
        &self.sync
    }

    /// Read access to the whole state
    pub async fn read(&self) -> RwLockReadGuard<'_, SimState> {
        self.state.read().await
    }

    /// Write access to the whole state, outside of a running round
    pub async fn write(&self) -> RwLockWriteGuard<'_, SimState> {
        self.state.write().await
    }

    // --- clock ---

    pub async fn now(&self) -> DateTime<Utc> {
        self.state.read().await.clock.now()
    }

    pub async fn cursor(&self) -> Cursor {
        self.state.read().await.clock.cursor()
    }

    /// Advance `n` steps, settling each one; `None` once the span runs out
    ///
    /// While strategies are running the caller checks in at the barrier once
    /// per step, so its siblings take every skipped turn and every round
    /// settles as usual. Outside a run the steps are settled in place.
    pub async fn fast_forward(&self, n: u64) -> Option<Cursor> {
        if self.sync.registered().await > 0 {
            let mut cursor = self.cursor().await;
            for _ in 0..n {
                match self.sync.checkpoint().await {
                    Ok(RoundOutcome::Advanced(next)) => cursor = next,
                    Ok(RoundOutcome::Finished) => return None,
                    Err(e) => {
                        tracing::warn!(error = %e, "fast_forward interrupted");
                        return None;
                    }
                }
            }
            return Some(cursor);
        }

        let mut state = self.state.write().await;
        let mut cursor = state.clock.cursor();
        for _ in 0..n {
            let (_, next) = state.settle_and_advance();
            cursor = next?;
        }
        Some(cursor)
    }

    /// Move to the latest step at or before `time`
    ///
    /// Moving forward settles every step passed, as `fast_forward` does.
    /// Moving back is only possible outside a run; during one the cursor
    /// stays where it is.
    pub async fn goto(&self, time: DateTime<Utc>) -> Cursor {
        let (current, target) = {
            let state = self.state.read().await;
            let target = state.clock.span().index_at_or_before(time);
            (state.clock.cursor(), target)
        };

        if target > current.index {
            return match self.fast_forward(target - current.index).await {
                Some(cursor) => cursor,
                None => self.cursor().await,
            };
        }
        if target < current.index && self.sync.registered().await > 0 {
            tracing::warn!(%time, now = %current.time, "Ignoring backward goto during a run");
            return current;
        }
        self.state.write().await.clock.goto(time)
    }

    // --- account and market data ---

    pub async fn account_info(&self) -> Account {
        self.state.read().await.broker.account().clone()
    }

    pub async fn symbol_info(&self, symbol: &str) -> Option<SymbolMeta> {
        let state = self.state.read().await;
        match state.store.symbol_info(symbol) {
            Ok(meta) => Some(meta.clone()),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "symbol_info failed");
                None
            }
        }
    }

    /// Current quote
    pub async fn symbol_info_tick(&self, symbol: &str) -> Option<Tick> {
        let state = self.state.read().await;
        let now = state.clock.now();
        match state.store.price_tick(symbol, now) {
            Ok(tick) => Some(tick),
            Err(e) => {
                tracing::warn!(symbol, error = %e, "symbol_info_tick failed");
                None
            }
        }
    }

    /// Candles that have closed by the current time
    pub async fn copy_rates(&self, symbol: &str, timeframe: Timeframe, window: Window) -> Vec<Candle> {
        let state = self.state.read().await;
        let now = state.clock.now();
        state
            .store
            .rates(symbol, timeframe, window, now)
            .unwrap_or_else(|e| {
                tracing::warn!(symbol, %timeframe, error = %e, "copy_rates failed");
                Vec::new()
            })
    }

    /// Ticks strictly before the current time
    pub async fn copy_ticks(&self, symbol: &str, window: Window) -> Vec<Tick> {
        let state = self.state.read().await;
        let now = state.clock.now();
        state.store.ticks(symbol, window, now).unwrap_or_else(|e| {
            tracing::warn!(symbol, error = %e, "copy_ticks failed");
            Vec::new()
        })
    }

    // --- trading ---

    pub async fn order_check(&self, request: &TradeRequest) -> CheckResult {
        let state = self.state.read().await;
        state
            .broker
            .order_check(&state.store, request, state.clock.now())
    }

    pub async fn order_send(&self, request: &TradeRequest) -> SendResult {
        let mut guard = self.state.write().await;
        let SimState {
            clock,
            store,
            broker,
        } = &mut *guard;
        broker.order_send(store, request, clock.now())
    }

    pub async fn positions_total(&self) -> usize {
        self.state.read().await.broker.ledger().positions_total()
    }

    pub async fn positions_get(&self, filter: &PositionFilter) -> Vec<Position> {
        let state = self.state.read().await;
        state
            .broker
            .ledger()
            .positions(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn history_orders_get(&self, filter: &HistoryFilter) -> Vec<Order> {
        let state = self.state.read().await;
        state
            .broker
            .ledger()
            .history_orders(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn history_deals_get(&self, filter: &HistoryFilter) -> Vec<Deal> {
        let state = self.state.read().await;
        state
            .broker
            .ledger()
            .history_deals(filter)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MarketDataProvider for SimulationContext {
    /// Quote at `time`, never later than the current simulated time
    async fn price_tick(&self, symbol: &str, time: DateTime<Utc>) -> Option<Tick> {
        let state = self.state.read().await;
        let time = time.min(state.clock.now());
        state.store.price_tick(symbol, time).ok()
    }

    async fn rates(&self, symbol: &str, timeframe: Timeframe, window: Window) -> Vec<Candle> {
        self.copy_rates(symbol, timeframe, window).await
    }

    async fn account_snapshot(&self) -> Account {
        self.account_info().await
    }

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolMeta> {
        SimulationContext::symbol_info(self, symbol).await
    }
}
