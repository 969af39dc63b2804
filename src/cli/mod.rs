//! CLI interface for lockstep
//!
//! Provides subcommands for:
//! - `import`: Load Parquet history into a snapshot
//! - `replay`: Advance a snapshot through its span
//! - `inspect`: Summarize a snapshot
//! - `config`: Show the effective configuration

mod import;
mod inspect;
mod replay;

pub use import::ImportArgs;
pub use inspect::InspectArgs;
pub use replay::{EquityMonitor, ReplayArgs};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lockstep")]
#[command(about = "Deterministic lock-stepped backtest simulator")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load Parquet tick and candle files into a snapshot
    Import(ImportArgs),
    /// Replay a snapshot through its span
    Replay(ReplayArgs),
    /// Print a snapshot summary
    Inspect(InspectArgs),
    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_replay() {
        let cli = Cli::parse_from([
            "lockstep",
            "--config",
            "other.toml",
            "replay",
            "--snapshot",
            "in.json",
            "--log-every",
            "10",
        ]);
        assert_eq!(cli.config, "other.toml");
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.snapshot.unwrap().to_str(), Some("in.json"));
                assert_eq!(args.log_every, 10);
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_default_path() {
        let cli = Cli::parse_from(["lockstep", "config"]);
        assert_eq!(cli.config, "config.toml");
        assert!(matches!(cli.command, Commands::Config));
    }
}
