//! Inspect command implementation

use crate::config::Config;
use crate::snapshot::Snapshot;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Snapshot to read (defaults to data.snapshot_path)
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,
}

impl InspectArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let path = self.snapshot.as_ref().unwrap_or(&config.data.snapshot_path);
        let snapshot = Snapshot::load(path)?;
        print!("{}", summary(&snapshot));
        Ok(())
    }
}

fn summary(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let span = &snapshot.span;
    let account = &snapshot.account;
    let ledger = &snapshot.ledger;

    out.push_str(&format!("Snapshot v{}\n", snapshot.version));
    out.push_str(&format!(
        "  Span: {} .. {} every {}s ({} steps)\n",
        span.start(),
        span.end(),
        span.step().num_seconds(),
        span.len()
    ));
    out.push_str(&format!(
        "  Cursor: step {} at {}\n",
        snapshot.cursor.index, snapshot.cursor.time
    ));

    out.push_str("  Symbols:\n");
    for meta in &snapshot.symbols {
        let ticks = snapshot.ticks.get(&meta.name).map_or(0, |t| t.len());
        let candles: usize = snapshot
            .rates
            .get(&meta.name)
            .map_or(0, |tfs| tfs.values().map(|c| c.len()).sum());
        out.push_str(&format!(
            "    {}: {} ticks, {} candles\n",
            meta.name, ticks, candles
        ));
    }

    out.push_str(&format!(
        "  Account: balance={} equity={} margin={} free={} level={}\n",
        account.balance, account.equity, account.margin, account.margin_free, account.margin_level
    ));
    out.push_str(&format!(
        "  Ledger: {} open positions, {} orders, {} deals\n",
        ledger.positions_total(),
        ledger.orders().len(),
        ledger.deals().len()
    ));
    out
}
