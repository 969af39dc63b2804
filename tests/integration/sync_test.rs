//! Lock-step behaviour across tasks and contexts

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lockstep::broker::{Account, SimBroker, StopOutMode};
use lockstep::clock::{SimClock, Span};
use lockstep::market::MarketDataStore;
use lockstep::sim::{run_strategies, SimulationContext, Step, Strategy, TaskExit};
use lockstep::sync::RoundOutcome;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn context(steps: i64, step: Duration) -> Arc<SimulationContext> {
    let span = Span::new(base(), base() + step * steps as i32, step).unwrap();
    let account = Account::new(dec!(1000), dec!(100), 2, StopOutMode::Percent, dec!(50));
    Arc::new(SimulationContext::new(
        SimClock::new(span),
        MarketDataStore::new(),
        SimBroker::new(account),
    ))
}

/// Logs `(task, time)` pairs into a shared journal
struct Journal {
    name: String,
    journal: Arc<Mutex<Vec<(String, DateTime<Utc>)>>>,
    cancel_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl Strategy for Journal {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step> {
        let now = ctx.now().await;
        self.journal.lock().unwrap().push((self.name.clone(), now));
        if self.cancel_at == Some(now) {
            ctx.sync().cancel();
        }
        Ok(Step::Continue)
    }
}

fn journals(
    names: &[&str],
    journal: &Arc<Mutex<Vec<(String, DateTime<Utc>)>>>,
) -> Vec<Box<dyn Strategy>> {
    names
        .iter()
        .map(|name| {
            Box::new(Journal {
                name: name.to_string(),
                journal: journal.clone(),
                cancel_at: None,
            }) as Box<dyn Strategy>
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_task_runs_ahead() {
    let ctx = context(20, Duration::minutes(1));
    let journal = Arc::new(Mutex::new(Vec::new()));

    let summary = run_strategies(ctx, journals(&["a", "b", "c", "d"], &journal)).await;
    assert_eq!(summary.rounds, 21);

    // Every step appears four times, and never after a later step
    let journal = journal.lock().unwrap();
    assert_eq!(journal.len(), 4 * 21);
    for (i, chunk) in journal.chunks(4).enumerate() {
        let expected = base() + Duration::minutes(i as i64);
        assert!(chunk.iter().all(|(_, t)| *t == expected));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_contexts_are_independent() {
    let fast = context(10, Duration::minutes(1));
    let slow = context(3, Duration::hours(1));
    let fast_journal = Arc::new(Mutex::new(Vec::new()));
    let slow_journal = Arc::new(Mutex::new(Vec::new()));

    let (fast_summary, slow_summary) = tokio::join!(
        run_strategies(fast.clone(), journals(&["f1", "f2"], &fast_journal)),
        run_strategies(slow.clone(), journals(&["s1", "s2", "s3"], &slow_journal)),
    );

    assert_eq!(fast_summary.rounds, 11);
    assert_eq!(slow_summary.rounds, 4);
    assert_eq!(fast.now().await, base() + Duration::minutes(10));
    assert_eq!(slow.now().await, base() + Duration::hours(3));
    assert!(slow_journal
        .lock()
        .unwrap()
        .iter()
        .all(|(name, _)| name.starts_with('s')));
}

#[tokio::test]
async fn test_cancel_mid_run_releases_everyone() {
    let ctx = context(100, Duration::minutes(1));
    let journal = Arc::new(Mutex::new(Vec::new()));

    let mut strategies = journals(&["a", "b"], &journal);
    strategies.push(Box::new(Journal {
        name: "canceller".to_string(),
        journal: journal.clone(),
        cancel_at: Some(base() + Duration::minutes(3)),
    }));

    let summary = run_strategies(ctx.clone(), strategies).await;

    assert_eq!(summary.rounds, 3);
    assert_eq!(summary.count(|e| *e == TaskExit::Cancelled), 3);
    assert!(ctx.sync().is_cancelled());
    assert_eq!(ctx.now().await, base() + Duration::minutes(3));
}

#[tokio::test]
async fn test_round_signal_reports_outcomes() {
    let ctx = context(2, Duration::minutes(1));
    let mut signals = ctx.sync().subscribe();

    ctx.sync().register(1).await;
    assert!(matches!(
        ctx.sync().checkpoint().await,
        Ok(RoundOutcome::Advanced(c)) if c.index == 1
    ));
    assert_eq!(signals.borrow_and_update().generation, 1);

    ctx.sync().checkpoint().await.unwrap();
    assert_eq!(ctx.sync().checkpoint().await, Ok(RoundOutcome::Finished));
    assert!(ctx.sync().done().await.is_terminal());
    // finished stays finished
    assert_eq!(ctx.sync().checkpoint().await, Ok(RoundOutcome::Finished));
}
