//! Rendering of log entries on stdout.

use bidi_log::LogEntry;
use std::io::Write;

/// How entries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// `[<level>] <type>: <text>`
    Text,
    /// One JSON object per line
    Json,
}

impl OutputMode {
    /// Mode for the `--json` flag.
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Renders one entry without a trailing newline.
#[must_use]
pub fn format_entry(entry: &LogEntry, mode: OutputMode) -> String {
    match mode {
        OutputMode::Text => entry.to_string(),
        // LogEntry only holds strings, numbers and JSON values.
        OutputMode::Json => serde_json::to_string(entry).unwrap_or_else(|e| {
            tracing::warn!("failed to encode entry: {e}");
            entry.to_string()
        }),
    }
}

/// Writes one entry to stdout. A closed pipe is ignored.
pub fn print_entry(entry: &LogEntry, mode: OutputMode) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", format_entry(entry, mode));
    let _ = stdout.flush();
}
