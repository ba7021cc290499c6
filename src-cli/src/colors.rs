//! Terminal color support for CLI output.
//!
//! Provides colorful output when running interactively, with automatic
//! detection to disable colors when output is piped or redirected.

use owo_colors::OwoColorize;
use std::io::IsTerminal;
use stitchcap_common::SessionState;
use stitchcap_service::session::format_elapsed;

/// Check if stdout is a terminal (interactive mode).
pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal()
}

/// Check if stderr is a terminal (interactive mode).
pub fn is_stderr_interactive() -> bool {
    std::io::stderr().is_terminal()
}

/// Style for error messages.
pub fn error(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{} {}", "error:".red().bold(), msg)
    } else {
        format!("error: {}", msg)
    }
}

/// Style for warning messages.
pub fn warning(msg: &str) -> String {
    if is_stderr_interactive() {
        format!("{} {}", "warning:".yellow().bold(), msg)
    } else {
        format!("warning: {}", msg)
    }
}

/// Style for success messages.
pub fn success(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.green())
    } else {
        msg.to_string()
    }
}

/// Style for info/status messages.
pub fn info(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.cyan())
    } else {
        msg.to_string()
    }
}

/// Style for dim/secondary text.
pub fn dim(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.dimmed())
    } else {
        msg.to_string()
    }
}

/// Style for header text (bold + color).
pub fn header(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.bold().blue())
    } else {
        msg.to_string()
    }
}

/// Style for file paths.
pub fn path(msg: &str) -> String {
    if is_interactive() {
        format!("{}", msg.underline())
    } else {
        msg.to_string()
    }
}

/// Recording indicator; `lit` alternates every tick.
pub fn recording_dot(lit: bool) -> String {
    if !is_interactive() {
        return "REC".to_string();
    }
    if lit {
        format!("{} {}", "●".red().bold(), "REC".red().bold())
    } else {
        format!("{} {}", "○".red(), "REC".red())
    }
}

/// Format elapsed time with color.
pub fn elapsed_time(seconds: u64) -> String {
    let time_str = format_elapsed(seconds);
    if is_interactive() {
        format!("{}", time_str.yellow().bold())
    } else {
        time_str
    }
}

/// Format state name with appropriate color.
pub fn state(state: SessionState) -> String {
    let name = state.as_str();
    if !is_interactive() {
        return name.to_string();
    }

    match state {
        SessionState::Idle => format!("{}", name.dimmed()),
        SessionState::CountingDown => format!("{}", name.cyan()),
        SessionState::Recording => format!("{}", name.red().bold()),
        SessionState::Paused => format!("{}", name.yellow()),
        SessionState::Finalizing => format!("{}", name.yellow().bold()),
    }
}
