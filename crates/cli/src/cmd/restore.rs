//! Restore a committed revision into a target directory

use crate::config::Settings;
use crate::util;
use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(
    settings: &Settings,
    target: &Path,
    generation: Option<u32>,
    revision: Option<u32>,
) -> Result<()> {
    let engine = settings.open_engine()?;
    let report = engine
        .restore(target, generation, revision)
        .context("Restore failed")?;

    if report.missing_generation {
        match generation {
            Some(generation) => bail!("generation {generation} has no committed backup"),
            None => bail!("nothing to restore: no committed backup"),
        }
    }

    println!("{}", "Restore".bold());
    println!("{}", util::RULE);
    println!(
        "Generation:    {}  revision {}",
        report.generation.to_string().cyan(),
        report.revision.to_string().cyan()
    );
    if let Some(requested) = revision.filter(|&r| r > report.revision) {
        println!(
            "               {}",
            format!("(requested revision {requested}, capped)").dimmed()
        );
    }
    println!("Target:        {}", target.display().to_string().cyan());
    println!("Files:         {}", report.restored);
    println!("Size:          {}", util::format_size(report.bytes));

    if report.failures.is_empty() {
        println!();
        println!("{}", "Restore complete ✓".green());
    } else {
        util::print_failures(&report.failures);
    }
    Ok(())
}
