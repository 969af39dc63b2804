//! Parquet import, snapshot persistence and deterministic replay

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lockstep::broker::TradeRequest;
use lockstep::config::Config;
use lockstep::data::{self, ParquetWriter, TickRecord};
use lockstep::ledger::{Direction, PositionFilter};
use lockstep::market::Tick;
use lockstep::sim::{run_strategies, SimState, SimulationContext, Step, Strategy};
use lockstep::snapshot::Snapshot;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn config() -> Config {
    let mut config = Config::example().unwrap();
    config.simulation.start = base();
    config.simulation.end = base() + Duration::minutes(5);
    config.simulation.step_secs = 60;
    config
}

/// EURUSD rising 5 pips a minute
fn write_ticks(dir: &Path) {
    let records: Vec<TickRecord> = (0..6)
        .map(|i| {
            let bid = dec!(1.10000) + dec!(0.00050) * Decimal::from(i);
            TickRecord {
                symbol: "EURUSD".to_string(),
                tick: Tick {
                    time: base() + Duration::minutes(i),
                    bid,
                    ask: bid + dec!(0.00020),
                    last: bid,
                    volume: dec!(1),
                },
            }
        })
        .collect();
    let writer = ParquetWriter::new(dir.to_path_buf());
    writer
        .write_ticks(&writer.file_path("ticks", "EURUSD"), &records)
        .unwrap();
}

fn import(dir: &Path) -> Snapshot {
    let config = config();
    let mut store = config.market_store();
    let stats = data::load_into(&mut store, dir).unwrap();
    assert_eq!(stats.ticks, 6);

    Snapshot::capture(&SimState {
        clock: config.clock().unwrap(),
        store,
        broker: config.broker(),
    })
}

/// Buys on the first step and closes everything at the third
struct InAndOut;

#[async_trait]
impl Strategy for InAndOut {
    fn name(&self) -> &str {
        "in-and-out"
    }

    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step> {
        let now = ctx.now().await;
        if now == base() {
            let result = ctx
                .order_send(&TradeRequest::market("EURUSD", Direction::Buy, dec!(0.2)))
                .await;
            anyhow::ensure!(result.is_done(), "open rejected: {}", result.code);
        } else if now == base() + Duration::minutes(3) {
            for position in ctx.positions_get(&PositionFilter::all()).await {
                let result = ctx.order_send(&TradeRequest::close(&position)).await;
                anyhow::ensure!(result.is_done(), "close rejected: {}", result.code);
            }
            return Ok(Step::Stop);
        }
        Ok(Step::Continue)
    }
}

async fn replay(snapshot: Snapshot) -> Snapshot {
    let ctx = Arc::new(SimulationContext::from_snapshot(snapshot).unwrap());
    let summary = run_strategies(ctx.clone(), vec![Box::new(InAndOut)]).await;
    assert_eq!(summary.failures(), 0);
    ctx.snapshot().await
}

#[tokio::test]
async fn test_import_save_load_round_trip() {
    let dir = TempDir::new().unwrap();
    write_ticks(dir.path());
    let imported = import(dir.path());

    let path = dir.path().join("snapshot.json");
    imported.save(&path).unwrap();
    let loaded = Snapshot::load(&path).unwrap();

    assert_eq!(loaded, imported);
    assert_eq!(loaded.ticks["EURUSD"].len(), 6);
    assert_eq!(loaded.cursor.index, 0);
}

#[tokio::test]
async fn test_replays_are_deterministic() {
    let dir = TempDir::new().unwrap();
    write_ticks(dir.path());
    let imported = import(dir.path());

    let first = replay(imported.clone()).await;
    let second = replay(imported).await;

    assert_eq!(first, second);
    // bought at 1.10020, sold at 1.10150
    assert_eq!(first.account.balance, dec!(10026.00));
    assert_eq!(first.ledger.positions_total(), 0);
    assert_eq!(first.ledger.deals().len(), 2);
}

#[tokio::test]
async fn test_resume_from_mid_run_snapshot() {
    let dir = TempDir::new().unwrap();
    write_ticks(dir.path());
    let imported = import(dir.path());

    // Open the position and stop on step 2
    let ctx = SimulationContext::from_snapshot(imported.clone()).unwrap();
    let opened = ctx
        .order_send(&TradeRequest::market("EURUSD", Direction::Buy, dec!(0.2)))
        .await;
    assert!(opened.is_done());
    ctx.fast_forward(2).await.unwrap();

    let path = dir.path().join("mid.json");
    ctx.snapshot().await.save(&path).unwrap();

    let resumed = SimulationContext::from_snapshot(Snapshot::load(&path).unwrap()).unwrap();
    assert_eq!(resumed.now().await, base() + Duration::minutes(2));
    assert_eq!(resumed.positions_total().await, 1);
    assert_eq!(
        resumed.account_info().await.margin,
        ctx.account_info().await.margin
    );

    let position = resumed.positions_get(&PositionFilter::all()).await.remove(0);
    let closed = resumed.order_send(&TradeRequest::close(&position)).await;
    assert!(closed.is_done());
    // the resumed ledger keeps allocating after the saved tickets
    assert!(closed.order.unwrap() > opened.deal.unwrap());
    // sold at 1.10100
    assert_eq!(resumed.account_info().await.balance, dec!(10016.00));
}
