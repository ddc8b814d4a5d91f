//! Error types for log inspection operations.
//!
//! This module provides a structured error hierarchy that distinguishes between
//! the failure modes of the inspector: the session cannot carry BiDi events,
//! a raw event cannot be normalized, a registered callback failed, and the
//! usual browser-side problems (launch, navigation, scripting, timeouts).
//! Each variant carries enough context to aid debugging.

use std::time::Duration;
use thiserror::Error;

/// The main error type for all inspector operations.
///
/// This enum uses thiserror to provide both Display implementations and
/// error source chaining.
#[derive(Debug, Error)]
pub enum InspectorError {
    /// The session cannot be used for BiDi event delivery.
    ///
    /// Raised when the session is not BiDi-capable or the underlying
    /// transport cannot be established. Fatal for the inspector instance.
    #[error("BiDi connection failed: {0}")]
    Connection(String),

    /// A raw event could not be turned into a `LogEntry`.
    ///
    /// Reported and skipped during dispatch; never fatal for the channel.
    #[error("malformed log event: {reason}")]
    MalformedEvent {
        /// What was missing or invalid in the payload
        reason: String,
    },

    /// A registered callback panicked while handling an entry.
    ///
    /// Isolated from other callbacks and reported to the tracing sink.
    #[error("callback for '{category}' failed: {message}")]
    Callback {
        /// Category the failing callback was registered for
        category: String,
        /// Panic payload rendered as text
        message: String,
    },

    /// The remote end answered a command with an error.
    #[error("command '{method}' failed: {message}")]
    Command {
        /// The BiDi method that was rejected
        method: String,
        /// Error text reported by the remote end
        message: String,
    },

    /// The session does not implement the requested command.
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),

    /// A protocol operation did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// How long we waited
        timeout: Duration,
    },

    /// A wait condition was not satisfied within the timeout.
    #[error("wait condition '{condition}' timed out after {timeout:?}")]
    WaitTimeout {
        /// Description of the condition that timed out
        condition: String,
        /// How long we waited before timing out
        timeout: Duration,
    },

    /// An operation was attempted on a closed inspector, channel or session.
    #[error("already closed")]
    AlreadyClosed,

    /// Failed to launch the browser process.
    ///
    /// This typically occurs when Chrome/Chromium is not installed,
    /// or when there are permission issues with the executable.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed {
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Navigation to a URL failed or timed out.
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed {
        /// The URL that failed to load
        url: String,
        /// Reason for the navigation failure
        reason: String,
    },

    /// JavaScript execution or element interaction in the page failed.
    #[error("JavaScript execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// Configuration could not be loaded or is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] chromiumoxide::error::CdpError),

    /// Wraps WebSocket transport errors.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors (file access, network, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectorError {
    /// Shorthand for a `MalformedEvent` error.
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        InspectorError::MalformedEvent {
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for inspector operations.
pub type Result<T> = std::result::Result<T, InspectorError>;
