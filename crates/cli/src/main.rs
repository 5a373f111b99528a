//! SignalSight CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write the default config
//! - `assemble` — Assemble the context for a single turn
//! - `replay`   — Replay a transcript turn by turn through one pipeline
//! - `shell`    — Interactive turns plus cache operator commands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "signalsight",
    about = "SignalSight — assistant context pipeline for trading analyses",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Assemble the context for one turn and print it
    Assemble {
        /// JSON file with `analyses` (and optional `snapshots`)
        #[arg(long)]
        analyses: PathBuf,

        /// Analysis bound to the conversation
        #[arg(long)]
        analysis_id: Option<String>,

        /// The new user message
        #[arg(short, long)]
        message: String,

        /// JSON transcript of the prior messages
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Force a first turn
        #[arg(long, conflicts_with = "subsequent")]
        first: bool,

        /// Force a subsequent turn
        #[arg(long)]
        subsequent: bool,

        /// Serve market data from the file's `snapshots` instead of HTTP
        #[arg(long)]
        offline: bool,
    },

    /// Replay every user turn of a transcript through one pipeline
    Replay {
        #[arg(long)]
        analyses: PathBuf,

        #[arg(long)]
        analysis_id: String,

        #[arg(long)]
        transcript: PathBuf,

        #[arg(long)]
        offline: bool,
    },

    /// Interactive session with cache operator commands
    Shell {
        #[arg(long)]
        analyses: PathBuf,

        #[arg(long)]
        analysis_id: String,

        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Assemble {
            analyses,
            analysis_id,
            message,
            transcript,
            first,
            subsequent,
            offline,
        } => {
            let position = match (first, subsequent) {
                (true, _) => Some(signalsight_context::TurnPosition::First),
                (_, true) => Some(signalsight_context::TurnPosition::Subsequent),
                _ => None,
            };
            commands::assemble::run(commands::assemble::AssembleArgs {
                analyses,
                analysis_id,
                message,
                transcript,
                position,
                offline,
            })
            .await?
        }
        Commands::Replay {
            analyses,
            analysis_id,
            transcript,
            offline,
        } => commands::replay::run(&analyses, &analysis_id, &transcript, offline).await?,
        Commands::Shell {
            analyses,
            analysis_id,
            offline,
        } => commands::shell::run(&analyses, &analysis_id, offline).await?,
    }

    Ok(())
}
