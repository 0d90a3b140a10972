//! ANSI styling for terminal output.

pub fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}

pub fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

pub fn gray(s: &str) -> String {
    format!("\x1b[90m{s}\x1b[0m")
}

/// Right-aligned bold green label, as in `     Created plinth.toml`.
pub fn status_label(label: &str) -> String {
    format!("\x1b[1;32m{label:>12}\x1b[0m")
}
