//! Waybill CLI
//!
//! Operator tools for inspecting and repairing a device's sync store.
//!
//! # Commands
//!
//! - `status` - Store, outbox and watermark summary
//! - `outbox` - List queued entries
//! - `stuck` - List entries that hit the retry cap
//! - `retry` - Make stuck entries eligible again
//! - `discard` - Drop an entry without delivering it
//! - `watermark` - Show or reset the pull watermark
//! - `sync` - Run one push-then-pull cycle against a server
//! - `compact` - Rewrite the journal as a snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Waybill sync store tools.
#[derive(Parser)]
#[command(name = "waybill")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long, env = "WAYBILL_STORE")]
    path: Option<PathBuf>,

    /// Delivery attempts before an entry counts as stuck
    #[arg(global = true, long, env = "WAYBILL_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store, outbox and watermark summary
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List queued outbox entries in delivery order
    Outbox {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List entries that reached the retry cap
    Stuck {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Reset the attempt counter of stuck entries
    Retry {
        /// Entry id to reset
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        id: Option<u64>,

        /// Reset every entry with failed attempts
        #[arg(short, long)]
        all: bool,
    },

    /// Remove an entry without delivering it
    Discard {
        /// Entry id to remove
        id: u64,
    },

    /// Show or reset the pull watermark
    Watermark {
        /// Reset to zero so the next pull fetches everything
        #[arg(short, long)]
        reset: bool,
    },

    /// Run one push-then-pull cycle
    Sync {
        /// Server base URL
        #[arg(short, long, env = "WAYBILL_SERVER_URL")]
        server: String,

        /// Bearer token
        #[arg(short, long, env = "WAYBILL_TOKEN", hide_env_values = true)]
        token: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Rewrite the journal as a single snapshot frame
    Compact,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let max_retries = cli.max_retries;
    match cli.command {
        Commands::Status { format } => {
            let path = cli.path.ok_or("Store path required for status")?;
            commands::status::run(&path, max_retries, &format)?;
        }
        Commands::Outbox { format } => {
            let path = cli.path.ok_or("Store path required for outbox")?;
            commands::outbox::list(&path, max_retries, false, &format)?;
        }
        Commands::Stuck { format } => {
            let path = cli.path.ok_or("Store path required for stuck")?;
            commands::outbox::list(&path, max_retries, true, &format)?;
        }
        Commands::Retry { id, all } => {
            let path = cli.path.ok_or("Store path required for retry")?;
            commands::outbox::retry(&path, max_retries, id, all)?;
        }
        Commands::Discard { id } => {
            let path = cli.path.ok_or("Store path required for discard")?;
            commands::outbox::discard(&path, max_retries, id)?;
        }
        Commands::Watermark { reset } => {
            let path = cli.path.ok_or("Store path required for watermark")?;
            commands::watermark::run(&path, reset)?;
        }
        Commands::Sync {
            server,
            token,
            timeout,
        } => {
            let path = cli.path.ok_or("Store path required for sync")?;
            commands::sync::run(&path, &server, &token, max_retries, timeout)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
        Commands::Version => {
            println!("Waybill CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Waybill Core v{}", waybill_core::VERSION);
        }
    }

    Ok(())
}
