//! Incremental backup against the last committed revision

use crate::config::Settings;
use crate::util;
use anyhow::{Context, Result};

pub fn run(settings: &Settings) -> Result<()> {
    let engine = settings.open_engine()?;
    let report = engine
        .incremental_backup()
        .context("Incremental backup failed")?;
    util::print_run_report(&report);
    Ok(())
}
