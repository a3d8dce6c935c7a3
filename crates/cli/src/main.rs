//! Chainback CLI - chainback command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod config;
mod util;

/// Chainback - incremental backups as per-file artifact chains
#[derive(Parser)]
#[command(name = "chainback")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ./chainback.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory tree to back up
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Directory holding generations and journals
    #[arg(long, global = true)]
    backup_root: Option<PathBuf>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot every file into a new generation
    Full,
    /// Store changes since the last committed revision
    Incremental,
    /// Rebuild the source tree from a committed revision
    Restore {
        /// Directory to write restored files into
        target: PathBuf,
        /// Generation to restore (default: latest committed)
        #[arg(short, long)]
        generation: Option<u32>,
        /// Revision within the generation (default: latest)
        #[arg(short, long)]
        revision: Option<u32>,
    },
    /// Show generations and backup size
    Status,
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = config::Settings::resolve(cli.config.as_deref(), cli.source, cli.backup_root)?;

    match cli.command {
        Commands::Full => cmd::full::run(&settings),
        Commands::Incremental => cmd::incremental::run(&settings),
        Commands::Restore {
            target,
            generation,
            revision,
        } => cmd::restore::run(&settings, &target, generation, revision),
        Commands::Status => cmd::status::run(&settings),
    }
}
