//! Firkin CLI
//!
//! Command-line tools for Firkin store management.
//!
//! # Commands
//!
//! - `set` / `get` / `del` - Point operations on a store
//! - `scan` - List key-value pairs in key order
//! - `compact` - Merge sealed segments to reclaim space
//! - `inspect` - Display store statistics and metadata
//! - `verify` - Check record checksums across every segment
//! - `repl` - Interactive session against a store

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Firkin command-line store tools.
#[derive(Parser)]
#[command(name = "firkin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a value under a key
    Set {
        /// Key to write
        key: String,

        /// Value to store
        value: String,
    },

    /// Read the value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Delete a key
    Del {
        /// Key to delete
        key: String,
    },

    /// List key-value pairs in key order
    Scan {
        /// First key of the range, inclusive (from the start if omitted)
        start: Option<String>,

        /// Key the range stops before, exclusive (to the end if omitted)
        end: Option<String>,

        /// Maximum number of pairs to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Merge sealed segments to reclaim space
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Display store statistics and metadata
    Inspect {
        /// Show per-segment details
        #[arg(short, long)]
        segments: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check record checksums across every segment
    Verify,

    /// Interactive session against a store
    Repl,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable.
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
        Commands::Set { key, value } => {
            let path = cli.path.ok_or("Store path required for set (use --path)")?;
            commands::kv::set(&path, &key, &value)?;
        }
        Commands::Get { key } => {
            let path = cli.path.ok_or("Store path required for get (use --path)")?;
            commands::kv::get(&path, &key)?;
        }
        Commands::Del { key } => {
            let path = cli.path.ok_or("Store path required for del (use --path)")?;
            commands::kv::del(&path, &key)?;
        }
        Commands::Scan { start, end, limit } => {
            let path = cli.path.ok_or("Store path required for scan (use --path)")?;
            commands::scan::run(&path, start.as_deref(), end.as_deref(), limit)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Store path required for compact (use --path)")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Inspect { segments, format } => {
            let path = cli.path.ok_or("Store path required for inspect (use --path)")?;
            commands::inspect::run(&path, segments, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Store path required for verify (use --path)")?;
            commands::verify::run(&path)?;
        }
        Commands::Repl => {
            let path = cli.path.ok_or("Store path required for repl (use --path)")?;
            commands::repl::run(&path)?;
        }
        Commands::Version => {
            println!("Firkin CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Firkin Core v{}", firkin_core::VERSION);
        }
    }

    Ok(())
}
