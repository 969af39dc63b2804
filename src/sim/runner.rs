//! Strategy tasks driven round by round

use super::context::SimulationContext;
use crate::sync::{RoundOutcome, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What a strategy wants after its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run again next round
    Continue,
    /// Keep checking in without running until the clock reaches the time
    SleepUntil(DateTime<Utc>),
    /// Leave the simulation
    Stop,
}

/// Trading logic run once per round
#[async_trait]
pub trait Strategy: Send + 'static {
    fn name(&self) -> &str;

    /// Take a turn at the current simulated time
    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step>;
}

/// How a strategy task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskExit {
    /// Ran until the span was exhausted
    Finished,
    /// Returned `Step::Stop`
    Stopped,
    Cancelled,
    /// Returned an error
    Failed(String),
    Panicked(String),
}

impl fmt::Display for TaskExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskExit::Finished => f.write_str("finished"),
            TaskExit::Stopped => f.write_str("stopped"),
            TaskExit::Cancelled => f.write_str("cancelled"),
            TaskExit::Failed(e) => write!(f, "failed: {}", e),
            TaskExit::Panicked(e) => write!(f, "panicked: {}", e),
        }
    }
}

/// Per-task result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub exit: TaskExit,
}

/// Result of `run_strategies`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Completed barrier rounds
    pub rounds: u64,
    pub tasks: Vec<TaskReport>,
}

impl RunSummary {
    pub fn count(&self, matches: impl Fn(&TaskExit) -> bool) -> usize {
        self.tasks.iter().filter(|t| matches(&t.exit)).count()
    }

    pub fn failures(&self) -> usize {
        self.count(|e| matches!(e, TaskExit::Failed(_) | TaskExit::Panicked(_)))
    }
}

/// Run strategies lock-stepped on the context's clock until all have left
///
/// Each strategy runs on its own task. A failing or panicking strategy is
/// logged and deregistered; its siblings keep running.
pub async fn run_strategies(
    ctx: Arc<SimulationContext>,
    strategies: Vec<Box<dyn Strategy>>,
) -> RunSummary {
    if strategies.is_empty() {
        tracing::info!("No strategies to run");
        return RunSummary {
            rounds: ctx.sync().generation(),
            tasks: Vec::new(),
        };
    }

    ctx.sync().register(strategies.len()).await;
    let start = ctx.now().await;
    tracing::info!(tasks = strategies.len(), %start, "Starting strategies");

    let mut set = JoinSet::new();
    for strategy in strategies {
        let ctx = ctx.clone();
        set.spawn(supervise(ctx, strategy));
    }

    let mut tasks = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => tasks.push(report),
            Err(e) => tracing::error!(error = %e, "Strategy supervisor failed"),
        }
    }

    let summary = RunSummary {
        rounds: ctx.sync().generation(),
        tasks,
    };
    tracing::info!(
        rounds = summary.rounds,
        tasks = summary.tasks.len(),
        failures = summary.failures(),
        "Strategies done"
    );
    summary
}

/// Drive one strategy on an inner task, deregistering whatever happens to it
async fn supervise(ctx: Arc<SimulationContext>, strategy: Box<dyn Strategy>) -> TaskReport {
    let name = strategy.name().to_string();
    let inner = tokio::spawn(drive(ctx.clone(), strategy));

    let exit = match inner.await {
        Ok(Ok(exit)) => exit,
        Ok(Err(e)) => {
            tracing::error!(strategy = %name, error = %e, "Strategy failed");
            TaskExit::Failed(e.to_string())
        }
        Err(e) if e.is_panic() => {
            tracing::error!(strategy = %name, "Strategy panicked");
            TaskExit::Panicked(panic_message(e.into_panic()))
        }
        Err(e) => TaskExit::Failed(e.to_string()),
    };

    ctx.sync().deregister().await;
    tracing::info!(strategy = %name, exit = %exit, "Strategy exited");
    TaskReport { name, exit }
}

async fn drive(
    ctx: Arc<SimulationContext>,
    mut strategy: Box<dyn Strategy>,
) -> anyhow::Result<TaskExit> {
    let mut asleep_until: Option<DateTime<Utc>> = None;

    loop {
        let now = ctx.now().await;
        if asleep_until.map_or(true, |until| now >= until) {
            asleep_until = None;
            match strategy.on_round(&ctx).await? {
                Step::Continue => {}
                Step::SleepUntil(until) => asleep_until = Some(until),
                Step::Stop => return Ok(TaskExit::Stopped),
            }
        }

        match ctx.sync().checkpoint().await {
            Ok(RoundOutcome::Advanced(_)) => {}
            Ok(RoundOutcome::Finished) => return Ok(TaskExit::Finished),
            Err(SyncError::Cancelled) => return Ok(TaskExit::Cancelled),
            Err(e) => return Err(e.into()),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s.to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "unknown panic".to_string()
}
