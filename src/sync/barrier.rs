//! Cyclic barrier with a privileged settlement step

use super::{RoundOutcome, Settlement, SyncError};
use crate::telemetry::{self, GaugeMetric, LatencyMetric};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::{watch, Mutex};

/// Broadcast to waiters whenever a round completes or the run is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundSignal {
    /// Completed rounds
    pub generation: u64,
    /// Outcome of the latest round
    pub outcome: Option<RoundOutcome>,
    pub cancelled: bool,
}

impl RoundSignal {
    /// No further rounds will run
    pub fn is_terminal(&self) -> bool {
        self.cancelled || self.outcome == Some(RoundOutcome::Finished)
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    expected: usize,
    arrived: usize,
    generation: u64,
    finished: bool,
}

/// Lock-steps registered tasks and runs `S` once per round
///
/// The last task to arrive runs the settlement while holding the barrier
/// lock, so nothing else can check in, register or deregister until the
/// round is published.
pub struct Synchronizer<S> {
    settlement: S,
    state: Mutex<BarrierState>,
    gate: watch::Sender<RoundSignal>,
    cancelled: AtomicBool,
}

impl<S: Settlement> Synchronizer<S> {
    pub fn new(settlement: S) -> Self {
        let (gate, _) = watch::channel(RoundSignal::default());
        Self {
            settlement,
            state: Mutex::new(BarrierState::default()),
            gate,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn settlement(&self) -> &S {
        &self.settlement
    }

    /// Set the number of tasks each round waits for
    pub async fn register(&self, expected: usize) {
        let mut state = self.state.lock().await;
        state.expected = expected;
        telemetry::set_gauge(GaugeMetric::RegisteredTasks, expected as f64);
        tracing::debug!(expected, "Barrier registered");

        if self.round_ready(&state) {
            self.complete_round(&mut state).await;
        }
    }

    /// Remove one task; completes the round if everyone left has arrived
    pub async fn deregister(&self) {
        let mut state = self.state.lock().await;
        state.expected = state.expected.saturating_sub(1);
        state.arrived = state.arrived.min(state.expected);
        telemetry::set_gauge(GaugeMetric::RegisteredTasks, state.expected as f64);
        tracing::debug!(expected = state.expected, "Task deregistered");

        if self.round_ready(&state) {
            self.complete_round(&mut state).await;
        }
    }

    pub async fn registered(&self) -> usize {
        self.state.lock().await.expected
    }

    /// Completed rounds so far
    pub fn generation(&self) -> u64 {
        self.gate.borrow().generation
    }

    /// Watch round completions
    pub fn subscribe(&self) -> watch::Receiver<RoundSignal> {
        self.gate.subscribe()
    }

    /// Arrive at the barrier and wait for the round to complete
    ///
    /// The arrival that completes the round runs the settlement itself.
    /// Once the span is finished every call returns `Finished` immediately.
    pub async fn checkpoint(&self) -> Result<RoundOutcome, SyncError> {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut rx = self.gate.subscribe();
        let mut state = self.state.lock().await;
        // cancel() may have landed while this task waited for the lock
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if state.finished {
            return Ok(RoundOutcome::Finished);
        }
        if state.expected == 0 {
            return Err(SyncError::NotRegistered);
        }

        state.arrived += 1;
        if state.arrived >= state.expected {
            return Ok(self.complete_round(&mut state).await);
        }

        let generation = state.generation;
        drop(state);

        let started = Instant::now();
        let signal = rx
            .wait_for(|s| s.cancelled || s.generation > generation)
            .await
            .map(|s| *s)
            .map_err(|_| SyncError::Cancelled)?;
        telemetry::record_latency(LatencyMetric::BarrierWait, started.elapsed());

        match signal.outcome {
            Some(outcome) if signal.generation > generation => Ok(outcome),
            _ => Err(SyncError::Cancelled),
        }
    }

    /// Release every waiter and refuse further checkpoints
    ///
    /// Synchronous so it can be called from a signal handler.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!("Simulation cancelled, releasing barrier");
        self.gate.send_modify(|s| s.cancelled = true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the span is finished or the run is cancelled
    ///
    /// With no tasks registered this idles; settlement never runs on its own.
    pub async fn done(&self) -> RoundSignal {
        let mut rx = self.gate.subscribe();
        let terminal = rx.wait_for(RoundSignal::is_terminal).await.map(|s| *s);
        terminal.unwrap_or_else(|_| *self.gate.borrow())
    }

    fn round_ready(&self, state: &BarrierState) -> bool {
        !state.finished
            && !self.is_cancelled()
            && state.expected > 0
            && state.arrived >= state.expected
    }

    async fn complete_round(&self, state: &mut BarrierState) -> RoundOutcome {
        let started = Instant::now();
        let outcome = self.settlement.settle().await;
        telemetry::record_latency(LatencyMetric::Settlement, started.elapsed());
        telemetry::record_round();

        state.arrived = 0;
        state.generation += 1;
        if outcome == RoundOutcome::Finished {
            state.finished = true;
        }
        if let RoundOutcome::Advanced(cursor) = outcome {
            telemetry::set_gauge(GaugeMetric::RoundIndex, cursor.index as f64);
        }

        let generation = state.generation;
        let cancelled = self.is_cancelled();
        self.gate.send_modify(|s| {
            s.generation = generation;
            s.outcome = Some(outcome);
            s.cancelled |= cancelled;
        });

        tracing::debug!(generation, ?outcome, "Round complete");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Cursor;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready, task};

    /// Advances a counter; finishes after `limit` rounds
    struct Counter {
        rounds: AtomicU64,
        limit: u64,
    }

    impl Counter {
        fn new(limit: u64) -> Self {
            Self {
                rounds: AtomicU64::new(0),
                limit,
            }
        }

        fn rounds(&self) -> u64 {
            self.rounds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Settlement for Counter {
        async fn settle(&self) -> RoundOutcome {
            let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
            if round >= self.limit {
                return RoundOutcome::Finished;
            }
            let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
            RoundOutcome::Advanced(Cursor {
                index: round,
                time: start + Duration::minutes(round as i64),
            })
        }
    }

    #[tokio::test]
    async fn test_round_waits_for_every_task() {
        let sync = Synchronizer::new(Counter::new(10));
        sync.register(2).await;

        let mut first = task::spawn(sync.checkpoint());
        assert_pending!(first.poll());
        assert_eq!(sync.settlement().rounds(), 0);
        // still waiting on the second task however often it is polled
        assert_pending!(first.poll());

        let second = sync.checkpoint().await.unwrap();
        assert!(matches!(second, RoundOutcome::Advanced(c) if c.index == 1));
        assert_eq!(sync.settlement().rounds(), 1);

        assert!(first.is_woken());
        let first = assert_ready!(first.poll()).unwrap();
        assert_eq!(first, second);
        assert_eq!(sync.settlement().rounds(), 1);
        assert_eq!(sync.generation(), 1);
    }

    #[tokio::test]
    async fn test_settles_once_per_round() {
        let sync = Arc::new(Synchronizer::new(Counter::new(100)));
        sync.register(4).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sync = sync.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    sync.checkpoint().await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(sync.settlement().rounds(), 5);
        assert_eq!(sync.generation(), 5);
    }

    #[tokio::test]
    async fn test_deregister_completes_round() {
        let sync = Synchronizer::new(Counter::new(10));
        sync.register(2).await;

        let mut waiting = task::spawn(sync.checkpoint());
        assert_pending!(waiting.poll());

        sync.deregister().await;
        assert_eq!(sync.settlement().rounds(), 1);
        assert!(waiting.is_woken());
        assert!(assert_ready!(waiting.poll()).is_ok());
        assert_eq!(sync.registered().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_waiters() {
        let sync = Synchronizer::new(Counter::new(10));
        sync.register(2).await;

        let mut waiting = task::spawn(sync.checkpoint());
        assert_pending!(waiting.poll());

        sync.cancel();
        assert!(waiting.is_woken());
        assert_eq!(assert_ready!(waiting.poll()), Err(SyncError::Cancelled));
        assert_eq!(sync.settlement().rounds(), 0);
        assert_eq!(sync.checkpoint().await, Err(SyncError::Cancelled));
        assert!(sync.done().await.cancelled);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_lock_skips_settlement() {
        let sync = Synchronizer::new(Counter::new(10));
        sync.register(1).await;

        let held = sync.state.lock().await;
        let mut arriving = task::spawn(sync.checkpoint());
        assert_pending!(arriving.poll());

        sync.cancel();
        drop(held);
        assert_eq!(assert_ready!(arriving.poll()), Err(SyncError::Cancelled));
        assert_eq!(sync.settlement().rounds(), 0);
        assert_eq!(sync.generation(), 0);
    }

    #[tokio::test]
    async fn test_zero_registered_idles() {
        let sync = Synchronizer::new(Counter::new(10));
        assert_eq!(sync.checkpoint().await, Err(SyncError::NotRegistered));

        let mut monitor = task::spawn(sync.done());
        assert_pending!(monitor.poll());
        assert_eq!(sync.settlement().rounds(), 0);
    }

    #[tokio::test]
    async fn test_finished_is_sticky() {
        let sync = Synchronizer::new(Counter::new(2));
        sync.register(1).await;

        assert!(matches!(
            sync.checkpoint().await,
            Ok(RoundOutcome::Advanced(_))
        ));
        assert_eq!(sync.checkpoint().await, Ok(RoundOutcome::Finished));
        assert_eq!(sync.checkpoint().await, Ok(RoundOutcome::Finished));
        assert_eq!(sync.settlement().rounds(), 2);
        assert_eq!(
            sync.done().await.outcome,
            Some(RoundOutcome::Finished)
        );
    }
}
