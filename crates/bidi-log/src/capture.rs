//! Accumulation of delivered log entries.
//!
//! `LogCapture` is a cheaply cloneable buffer that can be handed to any
//! `on_*` registration as its callback. Tests and the CLI then query the
//! entries, or suspend until enough of them arrived.
//!
//! We use `Arc<Mutex<Vec<LogEntry>>>` instead of channels because:
//! 1. Callers query accumulated entries multiple times
//! 2. Delivery order must be preserved
//! 3. The callback runs synchronously on the dispatch task and must not block

use crate::entry::{LogEntry, LogLevel};
use crate::error::{InspectorError, Result};
use crate::wait::{wait_for, WaitConfig};
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe log entry accumulator.
///
/// # Example
///
/// ```ignore
/// let capture = LogCapture::new();
/// inspector.on_javascript_exception(capture.sink(), None).await?;
/// page.click("#jsException").await?;
/// let entry = capture.wait_for_entry(WaitConfig::default()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogCapture {
    /// Creates a new, empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that appends every entry it receives.
    #[must_use]
    pub fn sink(&self) -> impl Fn(&LogEntry) + Send + Sync + 'static {
        let capture = self.clone();
        move |entry: &LogEntry| capture.push(entry.clone())
    }

    /// Appends an entry.
    pub fn push(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    /// Returns all captured entries as a snapshot.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Returns the first captured entry, if any.
    #[must_use]
    pub fn first(&self) -> Option<LogEntry> {
        self.lock().first().cloned()
    }

    /// Returns entries with the given level.
    #[must_use]
    pub fn with_level(&self, level: &LogLevel) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.level == *level)
            .cloned()
            .collect()
    }

    /// Returns the count of error-level entries.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.lock().iter().filter(|e| e.level.is_error()).count()
    }

    /// Returns the total number of entries captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing has been captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all captured entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Suspends until at least `count` entries were captured.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` if fewer entries arrived before the timeout.
    pub async fn wait_for_count(&self, count: usize, config: WaitConfig) -> Result<()> {
        wait_for(
            || async move { self.len() >= count },
            config,
            &format!("{count} log entries"),
        )
        .await
    }

    /// Suspends until an entry arrived and returns the first one.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` if nothing arrived before the timeout.
    pub async fn wait_for_entry(&self, config: WaitConfig) -> Result<LogEntry> {
        self.wait_for_count(1, config).await?;
        self.first().ok_or(InspectorError::WaitTimeout {
            condition: "first log entry".to_string(),
            timeout: config.timeout,
        })
    }

    // A panicking callback elsewhere must not hide entries captured here.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
