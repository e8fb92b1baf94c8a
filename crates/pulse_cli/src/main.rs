//! Pulse CLI
//!
//! Command-line tools for Pulse event logs.
//!
//! # Commands
//!
//! - `sync` - Run one sync exchange against an event log
//! - `inspect` - Display event log statistics
//! - `dump` - Dump committed events for debugging

mod commands;

use clap::{Parser, Subcommand};
use pulse_protocol::{ConflictPolicy, NO_CURSOR};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Pulse sync command-line tools.
#[derive(Parser)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the event log
    #[arg(global = true, short, long)]
    log: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync exchange against the event log
    Sync {
        /// File holding the SyncRequest JSON, or - for stdin
        #[arg(short, long, default_value = "-")]
        request: PathBuf,

        /// Conflict policy (overlap, newer-wins)
        #[arg(short, long, default_value_t = ConflictPolicy::OverlapReject)]
        policy: ConflictPolicy,

        /// Suggested client poll interval in milliseconds
        #[arg(long, default_value = "15000")]
        heartbeat_ms: u64,

        /// Maximum pending events per request (unlimited when omitted)
        #[arg(long)]
        max_pending: Option<usize>,

        /// Do not sync the log to disk after each append
        #[arg(long)]
        no_sync: bool,
    },

    /// Display event log statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump committed events for debugging
    Dump {
        /// Only show events with an id greater than this
        #[arg(short, long, default_value_t = NO_CURSOR)]
        after: i64,

        /// Maximum number of events to dump
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays clean.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Sync {
            request,
            policy,
            heartbeat_ms,
            max_pending,
            no_sync,
        } => {
            let log = cli.log.ok_or("Event log path required for sync")?;
            let options = commands::sync::SyncOptions {
                policy,
                heartbeat_ms,
                max_pending,
                no_sync,
            };
            commands::sync::run(&log, &request, &options)?;
        }
        Commands::Inspect { format } => {
            let log = cli.log.ok_or("Event log path required for inspect")?;
            commands::inspect::run(&log, &format)?;
        }
        Commands::Dump {
            after,
            limit,
            format,
        } => {
            let log = cli.log.ok_or("Event log path required for dump")?;
            commands::dump::run(&log, after, limit, &format)?;
        }
        Commands::Version => {
            println!("Pulse CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
