use crate::report::RunSummary;
use colored::{ColoredString, Colorize};
use convergence::StepStatus;
use std::path::Path;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

fn status_label(status: StepStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        StepStatus::Success => label.green(),
        StepStatus::Partial => label.yellow(),
        StepStatus::Failed => label.red().bold(),
        StepStatus::Skipped => label.dimmed(),
    }
}

/// Final console report
pub fn print_summary(summary: &RunSummary, dry_run: bool, log_file: &Path) {
    header("Hardening summary");
    for (name, status) in &summary.steps {
        println!("  {:<34} {}", name, status_label(*status));
    }

    section("Totals");
    kv("steps run", &summary.executed().to_string());
    kv("success", &summary.success.to_string());
    kv("partial", &summary.partial.to_string());
    kv("failed", &summary.failed.to_string());
    kv("skipped", &summary.skipped.to_string());

    if !summary.written.is_empty() {
        section("Results");
        for path in &summary.written {
            dim(&path.display().to_string());
        }
    }
    kv("log", &log_file.display().to_string());

    if !summary.notices.is_empty() {
        section("Before you log out");
        for notice in &summary.notices {
            warn(notice);
        }
    }

    println!();
    if summary.has_failures() {
        error("Some steps failed; see the log for details");
    } else if dry_run {
        info("Dry run complete; nothing was changed");
    } else {
        success("All selected steps completed");
    }
}
