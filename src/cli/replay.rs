//! Replay command implementation

use crate::config::Config;
use crate::sim::{run_strategies, SimulationContext, Step, Strategy};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Snapshot to replay (defaults to data.snapshot_path)
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Where to write the final state (defaults to `<snapshot>.replayed.json`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log the account every N rounds
    #[arg(long, default_value = "60")]
    pub log_every: u64,
}

impl ReplayArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let input = self.snapshot.as_ref().unwrap_or(&config.data.snapshot_path);
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| input.with_extension("replayed.json"));

        let ctx = Arc::new(SimulationContext::from_snapshot(Snapshot::load(input)?)?);
        let start = ctx.now().await;
        tracing::info!(snapshot = ?input, %start, "Replaying snapshot");

        let cancel_ctx = ctx.clone();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling replay");
                cancel_ctx.sync().cancel();
            }
        });

        let monitor = EquityMonitor::new(self.log_every);
        let summary = run_strategies(ctx.clone(), vec![Box::new(monitor)]).await;
        interrupt.abort();

        let snapshot = ctx.snapshot().await;
        snapshot.save(&output)?;

        let account = &snapshot.account;
        println!("Replay finished after {} rounds", summary.rounds);
        for task in &summary.tasks {
            println!("  {}: {}", task.name, task.exit);
        }
        println!(
            "  Balance: {}  Equity: {}  Open positions: {}",
            account.balance,
            account.equity,
            snapshot.ledger.positions_total()
        );
        println!("  Final state written to {}", output.display());
        Ok(())
    }
}

/// Strategy that only watches the account
pub struct EquityMonitor {
    log_every: u64,
    rounds: u64,
}

impl EquityMonitor {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
            rounds: 0,
        }
    }
}

#[async_trait]
impl Strategy for EquityMonitor {
    fn name(&self) -> &str {
        "equity-monitor"
    }

    async fn on_round(&mut self, ctx: &SimulationContext) -> anyhow::Result<Step> {
        if self.rounds % self.log_every == 0 {
            let now = ctx.now().await;
            let account = ctx.account_info().await;
            let positions = ctx.positions_total().await;
            tracing::info!(
                time = %now,
                balance = %account.balance,
                equity = %account.equity,
                margin_level = %account.margin_level,
                positions,
                "Account"
            );
        }
        self.rounds += 1;
        Ok(Step::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimState, TaskExit};
    use tempfile::TempDir;

    fn short_config() -> Config {
        let mut config = Config::example().unwrap();
        config.simulation.end = config.simulation.start + chrono::Duration::minutes(9);
        config
    }

    #[tokio::test]
    async fn test_monitor_runs_the_whole_span() {
        let config = short_config();
        let ctx = Arc::new(SimulationContext::new(
            config.clock().unwrap(),
            config.market_store(),
            config.broker(),
        ));

        let summary = run_strategies(ctx.clone(), vec![Box::new(EquityMonitor::new(3))]).await;

        assert_eq!(summary.rounds, 10);
        assert_eq!(summary.tasks[0].exit, TaskExit::Finished);
    }

    #[tokio::test]
    async fn test_replay_writes_output_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = short_config();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.json");

        let state = SimState {
            clock: config.clock().unwrap(),
            store: config.market_store(),
            broker: config.broker(),
        };
        Snapshot::capture(&state).save(&input).unwrap();

        let args = ReplayArgs {
            snapshot: Some(input),
            output: Some(output.clone()),
            log_every: 5,
        };
        args.execute(&config).await.unwrap();

        let replayed = Snapshot::load(&output).unwrap();
        assert_eq!(replayed.cursor.index, replayed.span.last_index());
        assert_eq!(replayed.account.balance, config.account.balance);
    }
}
