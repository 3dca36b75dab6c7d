//! HeartGuard companion CLI
//!
//! Follows a patient's status from the shared store and runs the
//! caregiver alert countdown in the terminal.

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{status, watch};
use guard_lib::sync::HttpStatusStore;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// HeartGuard companion CLI
#[derive(Parser)]
#[command(name = "hg")]
#[command(author, version, about = "Caregiver companion for HeartGuard monitoring", long_about = None)]
pub struct Cli {
    /// Status store URL (can also be set via HEARTGUARD_API_URL env var)
    #[arg(long, env = "HEARTGUARD_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the patient and answer alerts interactively
    Watch {
        /// Seconds between two polls of the store
        #[arg(long, default_value_t = 2)]
        poll_interval: u64,

        /// Seconds before an unanswered alert requests help on its own
        #[arg(long, default_value_t = guard_lib::escalation::DEFAULT_COUNTDOWN_SECS)]
        countdown_secs: u32,

        /// Caregiver name shown in prompts
        #[arg(long, env = "HEARTGUARD_CAREGIVER", default_value = "Family")]
        caregiver: String,
    },

    /// Show the latest status once
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let timeout = Duration::from_secs(cli.timeout);
    let store = Arc::new(
        HttpStatusStore::new(&cli.api_url, timeout).context("Failed to create store client")?,
    );

    match cli.command {
        Commands::Watch {
            poll_interval,
            countdown_secs,
            caregiver,
        } => {
            let options = watch::WatchOptions {
                poll_interval: Duration::from_secs(poll_interval.max(1)),
                request_timeout: timeout,
                countdown_secs,
                caregiver,
            };
            watch::run_watch(store, options).await?;
        }
        Commands::Status => {
            status::show_status(store.as_ref(), cli.format).await?;
        }
    }

    Ok(())
}
