//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Color a health/event status string based on its value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ok" => status.green().to_string(),
        "degraded" | "warning" => status.yellow().to_string(),
        "unhealthy" | "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Render an event success flag
pub fn format_success(success: bool) -> String {
    if success {
        "ok".green().to_string()
    } else {
        "failed".red().to_string()
    }
}

/// Format GiB values for table cells
pub fn format_gib(gib: f64) -> String {
    format!("{:.1}Gi", gib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_gib() {
        assert_eq!(format_gib(99.54), "99.5Gi");
        assert_eq!(format_gib(100.0), "100.0Gi");
    }
}
