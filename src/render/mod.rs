//! Command surface rendering (C11): text and JSON output for every verb.
//! Color is gated on whether stdout is a TTY, never a global switch.

pub mod json;
pub mod text;

use std::io::IsTerminal;

pub fn should_color() -> bool {
    std::io::stdout().is_terminal()
}

pub fn style_status(status: &str) -> colored::ColoredString {
    use colored::Colorize;
    if !should_color() {
        return status.normal();
    }
    match status {
        "ACTIVE" => status.green(),
        "STALE" | "CORRUPTED" => status.red(),
        "ORPHAN" => status.yellow(),
        _ => status.blue(),
    }
}
