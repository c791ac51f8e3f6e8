use colored::{ColoredString, Colorize};
use rollout::TxState;

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

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Symbol for a host's final transaction state
pub fn state_symbol(state: TxState) -> ColoredString {
    match state {
        TxState::Committed => "✓".green(),
        TxState::RolledBack => "↺".yellow(),
        TxState::Failed => "✗".red(),
        TxState::Idle => "○".blue(),
        TxState::Loaded | TxState::Diffed | TxState::Validated => "…".dimmed(),
    }
}
