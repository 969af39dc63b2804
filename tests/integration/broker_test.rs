//! Broker scenarios driven through the simulation context

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lockstep::broker::{Account, RetCode, SimBroker, StopOutMode, TradeRequest};
use lockstep::clock::{SimClock, Span};
use lockstep::ledger::{CloseReason, DealEntry, Direction, HistoryFilter, PositionFilter, Ticket};
use lockstep::market::{MarketDataStore, SymbolMeta, Tick};
use lockstep::sim::{run_strategies, SimulationContext, Step, Strategy, TaskExit};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn eurusd() -> SymbolMeta {
    SymbolMeta {
        name: "EURUSD".to_string(),
        digits: 5,
        point: dec!(0.00001),
        contract_size: dec!(100000),
        volume_min: dec!(0.01),
        volume_max: dec!(10),
        volume_step: dec!(0.01),
        stops_level: 0,
        margin_rate: dec!(1),
        currency_profit: "USD".to_string(),
    }
}

fn tick(minute: i64, bid: Decimal) -> Tick {
    Tick {
        time: base() + Duration::minutes(minute),
        bid,
        ask: bid + dec!(0.00020),
        last: bid,
        volume: dec!(1),
    }
}

/// EURUSD sliding from 1.10000 to 1.08000 over four one-minute steps
fn context(balance: Decimal) -> Arc<SimulationContext> {
    let mut store = MarketDataStore::new();
    store.insert_symbol(eurusd());
    store
        .insert_ticks(
            "EURUSD",
            vec![
                tick(0, dec!(1.10000)),
                tick(1, dec!(1.09500)),
                tick(2, dec!(1.08500)),
                tick(3, dec!(1.08000)),
            ],
        )
        .unwrap();

    let span = Span::new(base(), base() + Duration::minutes(3), Duration::minutes(1)).unwrap();
    let account = Account::new(balance, dec!(100), 2, StopOutMode::Percent, dec!(50));
    Arc::new(SimulationContext::new(
        SimClock::new(span),
        store,
        SimBroker::new(account),
    ))
}

/// Buys once on the first round, then holds
struct Buyer {
    volume: Decimal,
    ticket: Arc<Mutex<Option<Ticket>>>,
}

#[async_trait]
impl Strategy for Buyer {
    fn name(&self) -> &str {
        "buyer"
    }

    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step> {
        let holding = self.ticket.lock().unwrap().is_some();
        if !holding {
            let result = ctx
                .order_send(&TradeRequest::market("EURUSD", Direction::Buy, self.volume))
                .await;
            anyhow::ensure!(result.is_done(), "buy rejected: {}", result.code);
            *self.ticket.lock().unwrap() = result.position;
        }
        Ok(Step::Continue)
    }
}

/// Records the equity seen at each step
struct Watcher {
    seen: Arc<Mutex<Vec<(DateTime<Utc>, Decimal)>>>,
}

#[async_trait]
impl Strategy for Watcher {
    fn name(&self) -> &str {
        "watcher"
    }

    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step> {
        let now = ctx.now().await;
        let equity = ctx.account_info().await.equity;
        self.seen.lock().unwrap().push((now, equity));
        Ok(Step::Continue)
    }
}

#[tokio::test]
async fn test_margin_call_scenario() {
    let ctx = context(dec!(1000));
    let ticket = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let summary = run_strategies(
        ctx.clone(),
        vec![
            Box::new(Buyer {
                volume: dec!(0.5),
                ticket: ticket.clone(),
            }),
            Box::new(Watcher { seen: seen.clone() }),
        ],
    )
    .await;

    assert_eq!(summary.rounds, 4);
    assert_eq!(summary.count(|e| *e == TaskExit::Finished), 2);

    // From the second step on, the watcher sees the previous step settled
    let seen = seen.lock().unwrap();
    let later: Vec<_> = seen.iter().filter(|(t, _)| *t > base()).cloned().collect();
    assert_eq!(
        later,
        vec![
            (base() + Duration::minutes(1), dec!(990.00)),
            (base() + Duration::minutes(2), dec!(740.00)),
            (base() + Duration::minutes(3), dec!(240.00)),
        ]
    );

    // 0.5 lots bought at 1.10020, equity 240 against 550.10 margin at 1.08500
    let ticket = ticket.lock().unwrap().unwrap();
    let state = ctx.read().await;
    let closed = state.broker.closed_position(ticket).unwrap();
    assert_eq!(closed.reason, CloseReason::StopOut);
    assert_eq!(closed.price_close, dec!(1.08500));
    assert_eq!(closed.time_close, base() + Duration::minutes(2));
    assert_eq!(state.broker.account().balance, dec!(240.00));
    assert_eq!(state.broker.account().margin, Decimal::ZERO);
    assert!(state.broker.ledger().is_consistent());
}

#[tokio::test]
async fn test_insufficient_margin_leaves_state_unchanged() {
    let ctx = context(dec!(100));
    let before = ctx.read().await.broker.clone();

    let request = TradeRequest::market("EURUSD", Direction::Buy, dec!(1));
    let check = ctx.order_check(&request).await;
    assert_eq!(check.code, RetCode::NoMoney);

    let sent = ctx.order_send(&request).await;
    assert_eq!(sent.code, RetCode::NoMoney);
    assert!(sent.order.is_none());
    assert!(sent.deal.is_none());

    assert_eq!(ctx.read().await.broker, before);
    assert_eq!(ctx.history_orders_get(&HistoryFilter::default()).await.len(), 0);
}

#[tokio::test]
async fn test_open_and_close_round_trip() {
    let ctx = context(dec!(1000));

    let request = TradeRequest::market("EURUSD", Direction::Buy, dec!(0.1)).with_comment("entry");
    let check = ctx.order_check(&request).await;
    assert!(check.is_ok());
    // 0.1 lots at 1.10020 with 1:100 leverage
    assert_eq!(check.margin, dec!(110.02));

    let opened = ctx.order_send(&request).await;
    assert_eq!(opened.code, RetCode::Done);
    assert_eq!(opened.price, dec!(1.10020));
    let ticket = opened.position.unwrap();

    ctx.fast_forward(1).await.unwrap();
    let position = ctx
        .positions_get(&PositionFilter::all().ticket(ticket))
        .await
        .remove(0);
    assert_eq!(position.comment, "entry");

    let closed = ctx.order_send(&TradeRequest::close(&position)).await;
    assert_eq!(closed.code, RetCode::Done);
    assert_eq!(closed.price, dec!(1.09500));
    assert_eq!(ctx.positions_total().await, 0);

    let deals = ctx
        .history_deals_get(&HistoryFilter::default().position(ticket))
        .await;
    assert_eq!(deals.len(), 2);
    assert_eq!(deals[0].entry, DealEntry::In);
    assert_eq!(deals[1].entry, DealEntry::Out);
    assert_eq!(deals[1].profit, dec!(-52.00));

    let account = ctx.account_info().await;
    assert_eq!(account.balance, dec!(948.00));
    assert_eq!(account.equity, account.balance);
    assert_eq!(account.margin, Decimal::ZERO);
}

/// Buys with a stop-loss, then skips to the last step in one turn
struct SkipAhead {
    positions_after: Arc<Mutex<Option<usize>>>,
}

#[async_trait]
impl Strategy for SkipAhead {
    fn name(&self) -> &str {
        "skip-ahead"
    }

    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step> {
        let request = TradeRequest::market("EURUSD", Direction::Buy, dec!(0.1))
            .with_stops(dec!(1.09600), dec!(0));
        let result = ctx.order_send(&request).await;
        anyhow::ensure!(result.is_done(), "buy rejected: {}", result.code);

        ctx.fast_forward(3).await;
        let open = ctx.positions_total().await;
        *self.positions_after.lock().unwrap() = Some(open);
        Ok(Step::Stop)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_loss_fires_on_skipped_step() {
    let ctx = context(dec!(1000));
    let positions_after = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let summary = run_strategies(
        ctx.clone(),
        vec![
            Box::new(SkipAhead {
                positions_after: positions_after.clone(),
            }),
            Box::new(Watcher { seen: seen.clone() }),
        ],
    )
    .await;

    assert_eq!(summary.failures(), 0);
    assert_eq!(summary.rounds, 4);
    assert_eq!(*positions_after.lock().unwrap(), Some(0));

    // the watcher took its turn at every step, including the skipped ones
    let times: Vec<_> = seen.lock().unwrap().iter().map(|(t, _)| *t).collect();
    let every_step: Vec<_> = (0..4).map(|i| base() + Duration::minutes(i)).collect();
    assert_eq!(times, every_step);

    // stopped at the minute 1 bid, before the slide continued
    let deals = ctx.history_deals_get(&HistoryFilter::default()).await;
    assert_eq!(deals.len(), 2);
    assert_eq!(deals[1].time, base() + Duration::minutes(1));
    assert_eq!(deals[1].price, dec!(1.09500));
    assert_eq!(ctx.account_info().await.balance, dec!(948.00));
}
