//! The log inspector façade.
//!
//! `LogInspector` ties the pieces together: an `EventChannel` on the session,
//! one raw handler for `log.entryAdded` that normalizes payloads, and a
//! `Registry` that fans entries out to the callbacks registered through
//! `on_console_entry`, `on_javascript_log`, `on_javascript_exception` and
//! `on_log`.
//!
//! # Example
//!
//! ```ignore
//! let inspector = LogInspector::new(page.bidi_session().await?).await?;
//! let capture = LogCapture::new();
//! inspector.on_console_entry(capture.sink(), None).await?;
//!
//! page.click("#consoleLog").await?;
//! let entry = capture.wait_for_entry(WaitConfig::default()).await?;
//! assert_eq!(entry.text.as_deref(), Some("Hello, world!"));
//!
//! inspector.close().await;
//! ```

use crate::channel::{EventChannel, HandlerId};
use crate::entry::LogEntry;
use crate::error::{InspectorError, Result};
use crate::filter::Filter;
use crate::normalize::normalize;
use crate::registry::{Callback, Category, Registry, SubscriptionId};
use crate::session::{RawEvent, Session, LOG_ENTRY_ADDED};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Subscribes callbacks to browser log entries.
pub struct LogInspector {
    channel: EventChannel,
    registry: Arc<Registry>,
    raw_handler: Mutex<Option<HandlerId>>,
    malformed: Arc<AtomicU64>,
}

impl LogInspector {
    /// Creates an inspector bound to an active session.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the session cannot deliver BiDi events.
    pub async fn new(session: Arc<dyn Session>) -> Result<Self> {
        Self::with_contexts(session, Vec::new()).await
    }

    /// Creates an inspector that only listens to the given browsing contexts.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the session cannot deliver BiDi events.
    pub async fn with_contexts(session: Arc<dyn Session>, contexts: Vec<String>) -> Result<Self> {
        let channel = EventChannel::open_with_contexts(session, contexts)?;
        Ok(Self {
            channel,
            registry: Arc::new(Registry::new()),
            raw_handler: Mutex::new(None),
            malformed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Registers a callback for console entries.
    ///
    /// # Errors
    ///
    /// See [`LogInspector::subscribe`].
    pub async fn on_console_entry<F>(
        &self,
        callback: F,
        filter: Option<Filter>,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.subscribe(Category::Console, filter.unwrap_or_default(), callback)
            .await
    }

    /// Registers a callback for javascript entries that are not thrown exceptions.
    ///
    /// # Errors
    ///
    /// See [`LogInspector::subscribe`].
    pub async fn on_javascript_log<F>(
        &self,
        callback: F,
        filter: Option<Filter>,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.subscribe(Category::JavascriptLog, filter.unwrap_or_default(), callback)
            .await
    }

    /// Registers a callback for thrown javascript exceptions.
    ///
    /// # Errors
    ///
    /// See [`LogInspector::subscribe`].
    pub async fn on_javascript_exception<F>(
        &self,
        callback: F,
        filter: Option<Filter>,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.subscribe(
            Category::JavascriptException,
            filter.unwrap_or_default(),
            callback,
        )
        .await
    }

    /// Registers a callback for every log entry regardless of type.
    ///
    /// # Errors
    ///
    /// See [`LogInspector::subscribe`].
    pub async fn on_log<F>(&self, callback: F, filter: Option<Filter>) -> Result<SubscriptionId>
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.subscribe(Category::Any, filter.unwrap_or_default(), callback)
            .await
    }

    /// Registers a callback for a category with a filter.
    ///
    /// Returns once the browser has acknowledged the protocol subscription,
    /// so actions performed afterwards are guaranteed to be observed.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`, or the session's error if the
    /// protocol subscription fails.
    pub async fn subscribe<F>(
        &self,
        category: Category,
        filter: Filter,
        callback: F,
    ) -> Result<SubscriptionId>
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.ensure_raw_handler().await?;

        let callback: Callback = Arc::new(callback);
        let id = self
            .registry
            .register(category, filter, callback)
            .ok_or(InspectorError::AlreadyClosed)?;
        debug!(category = %category, subscription = %id, "registered log callback");
        Ok(id)
    }

    /// Removes one registration. Returns false if it did not exist.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unregister(id)
    }

    /// Clears every registration and closes the channel.
    ///
    /// Safe to call repeatedly and before any event was received. No
    /// callback registered on this inspector fires afterwards.
    pub async fn close(&self) {
        self.registry.close();
        self.raw_handler.lock().await.take();
        self.channel.close().await;
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Number of callback invocations that panicked.
    #[must_use]
    pub fn callback_failures(&self) -> u64 {
        self.registry.failures()
    }

    /// Number of raw events that could not be normalized.
    #[must_use]
    pub fn malformed_events(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    async fn ensure_raw_handler(&self) -> Result<()> {
        if self.is_closed() {
            return Err(InspectorError::AlreadyClosed);
        }

        let mut slot = self.raw_handler.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let registry = self.registry.clone();
        let malformed = self.malformed.clone();
        let id = self
            .channel
            .subscribe_raw(
                LOG_ENTRY_ADDED,
                Arc::new(move |event: &RawEvent| match normalize(event) {
                    Ok(entry) => {
                        registry.dispatch(&entry);
                    }
                    Err(e) => {
                        malformed.fetch_add(1, Ordering::Relaxed);
                        warn!("skipping log event: {e}");
                    }
                }),
            )
            .await?;
        *slot = Some(id);
        Ok(())
    }
}

impl fmt::Debug for LogInspector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogInspector")
            .field("channel", &self.channel)
            .field("registry", &self.registry)
            .field("malformed", &self.malformed_events())
            .finish()
    }
}
