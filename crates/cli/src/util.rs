//! Output helpers shared by commands

use chainback_engine::{FileFailure, RunReport};
use owo_colors::OwoColorize;

pub const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Format bytes as a human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn print_run_report(report: &RunReport) {
    let title = format!("{} backup", report.kind);
    println!("{}", title.bold());
    println!("{RULE}");
    println!(
        "Generation:    {}  revision {}",
        report.generation.to_string().cyan(),
        report.revision.to_string().cyan()
    );
    println!("Snapshots:     {}", report.snapshots);
    println!("Diffs:         {}", report.diffs);
    println!("Removed:       {}", report.removals);
    println!("Unchanged:     {}", report.unchanged.to_string().dimmed());
    if report.skipped > 0 {
        println!("Not modified:  {}", report.skipped.to_string().dimmed());
    }
    println!("Written:       {}", format_size(report.bytes_written));

    if report.is_clean() {
        println!();
        println!("{}", "Backup committed ✓".green());
    } else {
        print_failures(&report.failures);
    }
}

pub fn print_failures(failures: &[FileFailure]) {
    println!();
    println!("{} {}", "Failed files:".yellow().bold(), failures.len());
    for failure in failures {
        println!(
            "  {} {} {}",
            failure.path,
            format!("[{}]", failure.kind).yellow(),
            failure.message.dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
