//! Show generations and backup size

use crate::config::Settings;
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

pub fn run(settings: &Settings) -> Result<()> {
    let engine = settings.open_engine()?;
    let status = engine.status().context("Failed to read backup status")?;

    println!("{}", "Backup Status".bold());
    println!("{}", util::RULE);
    println!();
    println!("Source:        {}", settings.source.display().to_string().cyan());
    println!("Backup root:   {}", settings.backup_root.display().to_string().cyan());
    println!("Size:          {}", util::format_size(status.total_bytes));
    if status.busy {
        println!("Lock:          {}", "held by a running backup".yellow());
    }
    println!();

    match status.current() {
        Some(current) => println!(
            "Current:       generation {} at revision {}",
            current.generation.to_string().green(),
            current.revision.unwrap_or_default().to_string().green()
        ),
        None => {
            println!("Current:       {}", "no committed backup".yellow());
            return Ok(());
        }
    }

    println!();
    println!("{}", "Generations".bold());
    for info in &status.generations {
        match info.revision {
            Some(revision) => println!(
                "  {:>4}  revision {:<6} {} files",
                info.generation, revision, info.tracked
            ),
            None => println!(
                "  {:>4}  {}",
                info.generation,
                "uncommitted".yellow()
            ),
        }
    }
    Ok(())
}
