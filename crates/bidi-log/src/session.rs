//! The session abstraction the event channel is opened against.
//!
//! A `Session` is anything that can execute BiDi commands and hand out a
//! stream of raw events: a live WebSocket connection, a CDP bridge into a
//! launched Chrome, or an in-memory replay. The inspector never knows which.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// BiDi event emitted for every new log entry.
pub const LOG_ENTRY_ADDED: &str = "log.entryAdded";

/// BiDi command enabling event delivery for a set of event names. The reply
/// carries a `subscription` id.
pub const SESSION_SUBSCRIBE: &str = "session.subscribe";

/// BiDi command releasing subscriptions, by id or by event name.
pub const SESSION_UNSUBSCRIBE: &str = "session.unsubscribe";

/// An event exactly as received from the remote end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Protocol event name, e.g. `log.entryAdded`
    pub method: String,
    /// Event payload
    #[serde(default)]
    pub params: Value,
}

impl RawEvent {
    /// Creates a new raw event.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Creates a `log.entryAdded` event with the given payload.
    #[must_use]
    pub fn log_entry(params: Value) -> Self {
        Self::new(LOG_ENTRY_ADDED, params)
    }
}

/// A browser session able to carry BiDi commands and events.
///
/// Implementations must be cheap to share behind an `Arc`. Each call to
/// `subscribe_events` returns an independent receiver, so several channels
/// (and therefore several inspectors) can attach to one session without
/// stealing each other's events.
#[async_trait]
pub trait Session: Send + Sync {
    /// Returns true if the session can deliver BiDi events.
    ///
    /// Checked once when a channel is opened.
    fn supports_bidi(&self) -> bool {
        true
    }

    /// Sends a command and waits for its result.
    async fn send_command(&self, method: &str, params: Value) -> Result<Value>;

    /// Returns a fresh receiver for raw inbound events.
    fn subscribe_events(&self) -> broadcast::Receiver<RawEvent>;
}
