//! CLI for the reconnd reconnection scheduler.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reconnd_core::config::{self, ReconnConfig};
use std::path::PathBuf;

use commands::{run_periods, run_simulate, SimulateOptions};

/// Top-level CLI for reconnd.
#[derive(Debug, Parser)]
#[command(name = "reconnd")]
#[command(about = "reconnd: peer reconnection scheduler with escalating backoff", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/reconnd/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the backoff schedule, e.g. "1,5,15" (seconds per consecutive failure).
    #[arg(long, global = true, value_name = "SECS")]
    pub schedule: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print the backoff chosen for each failure count.
    Periods {
        /// Zero-based consecutive failure counts.
        #[arg(required = true, allow_negative_numbers = true)]
        counts: Vec<i64>,
    },

    /// Reconnect simulated peers that fail a fixed number of times, then exit.
    Simulate {
        /// Number of simulated peers.
        #[arg(long, default_value = "3", value_name = "N")]
        peers: usize,
        /// Connection attempts that fail before a peer connects.
        #[arg(long, default_value = "2", value_name = "K")]
        failures: u32,
        /// Time each (blocking) connection attempt takes.
        #[arg(long, default_value = "200", value_name = "MS")]
        connect_ms: u64,
    },
}

impl Cli {
    /// Effective config: file (explicit or XDG default) plus command-line
    /// overrides. Validated after the overrides, so `--schedule` can stand in
    /// for a bad schedule in the file.
    fn resolve_config(&self) -> Result<ReconnConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::read_from_path(path)?,
            None => config::read_or_init()?,
        };
        if let Some(schedule) = &self.schedule {
            cfg.reconnection_periods = schedule.clone();
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = cli.resolve_config()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Periods { counts } => run_periods(&cfg, &counts)?,
            CliCommand::Simulate {
                peers,
                failures,
                connect_ms,
            } => {
                let opts = SimulateOptions {
                    peers,
                    failures,
                    connect_ms,
                };
                let summary = run_simulate(&cfg, &opts).await?;
                println!(
                    "{} peer(s) connected after {} attempt(s) in {:.1}s",
                    summary.connected, summary.attempts, summary.elapsed_secs
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
