//! Normalized log entry records.
//!
//! A `LogEntry` is the uniform shape every BiDi `log.entryAdded` payload is
//! turned into, regardless of whether it came from a console API call, a
//! generic javascript log, or a thrown exception. Entries are immutable once
//! built and are handed to callbacks by reference.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin type of a log entry.
///
/// The set is open: the remote end may report types this crate does not
/// know yet, which are preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryType {
    /// `console.*` API calls
    Console,
    /// Javascript runtime logs and exceptions
    Javascript,
    /// Any type reported by the browser that has no dedicated variant
    Other(String),
}

impl EntryType {
    /// Returns the protocol name of this type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EntryType::Console => "console",
            EntryType::Javascript => "javascript",
            EntryType::Other(name) => name,
        }
    }
}

impl From<&str> for EntryType {
    fn from(s: &str) -> Self {
        match s {
            "console" => EntryType::Console,
            "javascript" => EntryType::Javascript,
            other => EntryType::Other(other.to_string()),
        }
    }
}

impl From<String> for EntryType {
    fn from(s: String) -> Self {
        EntryType::from(s.as_str())
    }
}

impl From<EntryType> for String {
    fn from(kind: EntryType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The severity level of a log entry.
///
/// Levels compare by exact, case-sensitive name: `"warn"` and `"warning"`
/// are both accepted spellings of `Warning`, while `"Error"` is an unknown
/// level kept in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    /// `debug`
    Debug,
    /// `info`
    Info,
    /// `warn` / `warning`
    Warning,
    /// `error`
    Error,
    /// Any other driver-reported level
    Other(String),
}

impl LogLevel {
    /// Returns the canonical name of this level.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Other(name) => name,
        }
    }

    /// Returns true if this is an error-level entry.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, LogLevel::Error)
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            other => LogLevel::Other(other.to_string()),
        }
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        LogLevel::from(s.as_str())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame of a javascript stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    /// Name of the function, empty for anonymous code
    #[serde(default)]
    pub function_name: String,
    /// Script URL
    #[serde(default)]
    pub url: String,
    /// Zero-based line number
    #[serde(default)]
    pub line_number: u64,
    /// Zero-based column number
    #[serde(default)]
    pub column_number: u64,
}

/// Structured stack trace attached to javascript exceptions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    /// Frames, innermost first, in the order the browser reported them
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
}

/// Where an entry was produced.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntrySource {
    /// Realm id reported in the event source
    #[serde(default)]
    pub realm: Option<String>,
    /// Browsing context id
    #[serde(default)]
    pub context: Option<String>,
}

/// A normalized log entry.
///
/// Invariant: `stack_trace` is `Some` if and only if the entry represents a
/// thrown javascript exception. Console entries always carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Origin type (console, javascript, ...)
    #[serde(rename = "type")]
    pub kind: EntryType,

    /// Severity level
    pub level: LogLevel,

    /// Human-readable message. For exceptions, the formatted error message.
    pub text: Option<String>,

    /// Console method (`log`, `error`, ...) for console entries only.
    pub method: Option<String>,

    /// Execution realm identifier, when the event names one directly.
    pub realm: Option<String>,

    /// Arguments of a console call as raw BiDi remote values.
    pub args: Vec<serde_json::Value>,

    /// Stack trace for javascript exceptions.
    pub stack_trace: Option<StackTrace>,

    /// Capture time in milliseconds since the Unix epoch, as reported by the browser.
    pub timestamp: u64,

    /// Event source (realm and browsing context), if reported.
    pub source: Option<EntrySource>,
}

impl LogEntry {
    /// Returns true for console-originated entries.
    #[must_use]
    pub fn is_console(&self) -> bool {
        self.kind == EntryType::Console
    }

    /// Returns true if this entry represents a thrown javascript exception.
    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.kind == EntryType::Javascript && self.stack_trace.is_some()
    }

    /// Returns the message text, or an empty string when the browser sent none.
    #[must_use]
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.kind, self.text_or_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing_is_case_sensitive() {
        assert_eq!(LogLevel::from("error"), LogLevel::Error);
        assert_eq!(LogLevel::from("warn"), LogLevel::Warning);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warning);
        assert_eq!(LogLevel::from("Error"), LogLevel::Other("Error".into()));
        assert!(LogLevel::Error.is_error());
        assert!(!LogLevel::Warning.is_error());
    }

    #[test]
    fn entry_type_keeps_unknown_names() {
        assert_eq!(EntryType::from("console"), EntryType::Console);
        let custom = EntryType::from("network");
        assert_eq!(custom.as_str(), "network");
        assert_eq!(String::from(custom), "network");
    }

    #[test]
    fn entry_serializes_with_protocol_names() {
        let entry = LogEntry {
            kind: EntryType::Console,
            level: LogLevel::Info,
            text: Some("hi".into()),
            method: Some("log".into()),
            realm: None,
            args: vec![],
            stack_trace: None,
            timestamp: 7,
            source: None,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "console");
        assert_eq!(value["level"], "info");
        assert_eq!(value["stackTrace"], serde_json::Value::Null);
        assert_eq!(entry.to_string(), "[info] console: hi");
    }
}
