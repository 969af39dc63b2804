//! Import command implementation

use crate::config::Config;
use crate::data;
use crate::sim::SimState;
use crate::snapshot::Snapshot;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Parquet file or directory (defaults to data.input_dir)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Snapshot to write (defaults to data.snapshot_path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ImportArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let input = self.input.as_ref().unwrap_or(&config.data.input_dir);
        let output = self.output.as_ref().unwrap_or(&config.data.snapshot_path);

        let clock = config.clock()?;
        let mut store = config.market_store();
        let stats = data::load_into(&mut store, input)?;
        tracing::info!(
            input = ?input,
            files = stats.files,
            ticks = stats.ticks,
            candles = stats.candles,
            skipped_rows = stats.skipped_rows,
            "Imported market history"
        );

        let state = SimState {
            clock,
            store,
            broker: config.broker(),
        };
        let snapshot = Snapshot::capture(&state);
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        snapshot.save(output)?;

        println!(
            "Imported {} ticks and {} candles from {} files into {}",
            stats.ticks,
            stats.candles,
            stats.files,
            output.display()
        );
        if stats.skipped_rows > 0 {
            println!("Skipped {} rows for unconfigured symbols", stats.skipped_rows);
        }
        Ok(())
    }
}
