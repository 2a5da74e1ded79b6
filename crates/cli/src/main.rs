//! EBS Monitor CLI
//!
//! A command-line tool for inspecting the EBS monitor daemon: volume
//! status, per-volume event history and daemon health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{events, health, status};

/// EBS Monitor CLI
#[derive(Parser)]
#[command(name = "ebsmon")]
#[command(author, version, about = "CLI for the EBS monitor daemon", long_about = None)]
pub struct Cli {
    /// Daemon API URL (can also be set via EBSMON_API_URL env var)
    #[arg(long, env = "EBSMON_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show a summary of every monitored volume
    Status,

    /// Show the event history of one volume
    Events {
        /// Volume id (vol-...)
        volume_id: String,

        /// Only show failed events
        #[arg(long)]
        failed_only: bool,
    },

    /// Show daemon component health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
        Commands::Events {
            volume_id,
            failed_only,
        } => {
            events::show_events(&client, &volume_id, failed_only, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}
