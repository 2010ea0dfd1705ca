//! Colored output for recipe runs
//!
//! Uses owo-colors for terminal colors. Every line printed here is also
//! emitted as a `tracing` event so that logs stay complete when stdout is
//! redirected.

use owo_colors::OwoColorize;

/// Print an action header (blue, bold)
/// Example: "==> Installing openerp"
pub fn action(message: &str) {
    tracing::info!("{}", message);
    println!("{} {}", "==>".blue().bold(), message.bold());
}

/// Print a sub-action (cyan arrow)
/// Example: "  -> fetch"
pub fn sub_action(phase: &str) {
    tracing::debug!(phase, "phase");
    println!("  {} {}", "->".cyan(), phase);
}

/// Print a detail line (dimmed prefix)
/// Example: "     downloading https://..."
pub fn detail(message: &str) {
    tracing::debug!("{}", message);
    println!("     {}", message.dimmed());
}

/// Print a success message (green)
/// Example: "==> openerp 7.0-1 installed in parts/openerp"
pub fn success(message: &str) {
    tracing::info!("{}", message);
    println!("{} {}", "==>".green().bold(), message.green());
}

/// Print an info message (cyan)
/// Example: ":: froze openerp to frozen.toml"
pub fn info(message: &str) {
    tracing::info!("{}", message);
    println!("{} {}", "::".cyan(), message);
}

/// Print a warning message (yellow), on stderr
pub fn warning(message: &str) {
    tracing::warn!("{}", message);
    eprintln!("{} {}", "warning:".yellow().bold(), message.yellow());
}

/// Print a skip message (dimmed)
/// Example: "==> no need to re-download openerp-7.0-1.tar.gz"
pub fn skip(message: &str) {
    tracing::info!("{}", message);
    println!("{} {}", "==>".dimmed(), message.dimmed());
}

/// Print a `key = value` line, used by `show`
pub fn field(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").cyan(), value);
}
