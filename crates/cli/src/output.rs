//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a warning when empty
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: i64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value >= GB {
        format!("{:.2}Gi", value / GB)
    } else if value >= MB {
        format!("{:.0}Mi", value / MB)
    } else if value >= KB {
        format!("{:.0}Ki", value / KB)
    } else {
        format!("{}B", bytes)
    }
}

/// Format cores as millicores below one core
pub fn format_cpu(cores: f64) -> String {
    if cores >= 1.0 {
        format!("{:.2}", cores)
    } else {
        format!("{:.0}m", cores * 1000.0)
    }
}

/// Format a monthly amount in dollars
pub fn format_currency(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// Format an RFC3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => ts.to_string(),
    }
}

/// Color a provisioning status
pub fn color_status(status: &str) -> String {
    match status {
        "over-provisioned" => status.yellow().to_string(),
        "under-provisioned" => status.red().to_string(),
        "optimal" => status.green().to_string(),
        _ => status.to_string(),
    }
}

/// Color a confidence grade
pub fn color_confidence(confidence: &str) -> String {
    match confidence {
        "high" => confidence.green().to_string(),
        "medium" => confidence.yellow().to_string(),
        "low" => confidence.red().to_string(),
        _ => confidence.to_string(),
    }
}
