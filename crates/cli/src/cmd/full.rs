//! Full backup into a new generation

use crate::config::Settings;
use crate::util;
use anyhow::{Context, Result};

pub fn run(settings: &Settings) -> Result<()> {
    let engine = settings.open_engine()?;
    let report = engine.full_backup().context("Full backup failed")?;
    util::print_run_report(&report);
    Ok(())
}
