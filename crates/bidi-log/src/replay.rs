//! In-memory session for replaying recorded events.
//!
//! `ReplaySession` never talks to a browser. Events are injected with
//! `push`, or loaded from a JSONL recording (one `{"method", "params"}`
//! object per line) and re-emitted with `replay`. Every command it receives
//! is recorded so callers can check which protocol subscriptions were made.
//!
//! Like a browser, the session only emits events somebody subscribed to:
//! `session.subscribe` returns a subscription id, and `session.unsubscribe`
//! releases either those ids or, in the legacy form, whole event names.

use crate::error::{InspectorError, Result};
use crate::session::{RawEvent, Session, SESSION_SUBSCRIBE, SESSION_UNSUBSCRIBE};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Default broadcast capacity for replayed events.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1024;

/// A session backed by memory instead of a browser.
#[derive(Debug)]
pub struct ReplaySession {
    events: broadcast::Sender<RawEvent>,
    recording: Mutex<Vec<RawEvent>>,
    commands: Mutex<Vec<(String, Value)>>,
    // Active subscriptions as (id, event names).
    subscriptions: Mutex<Vec<(String, Vec<String>)>>,
    next_subscription: AtomicU64,
    bidi: AtomicBool,
    reject_commands: AtomicBool,
}

impl ReplaySession {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Creates an empty session with the given event buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            events,
            recording: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            bidi: AtomicBool::new(true),
            reject_commands: AtomicBool::new(false),
        }
    }

    /// Creates a session holding the given recording.
    #[must_use]
    pub fn from_events(events: Vec<RawEvent>) -> Self {
        let session = Self::with_capacity(events.len().max(DEFAULT_REPLAY_CAPACITY));
        *session.recording.lock().unwrap_or_else(PoisonError::into_inner) = events;
        session
    }

    /// Loads a JSONL recording. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or `MalformedEvent`
    /// naming the first line that is not a raw event object.
    pub async fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let events = parse_jsonl(&content)?;
        Ok(Self::from_events(events))
    }

    /// Emits one event to every open channel. Returns how many receivers got it.
    ///
    /// Events nobody is subscribed to are dropped and count as zero.
    pub fn push(&self, event: RawEvent) -> usize {
        if !self.is_subscribed(&event.method) {
            return 0;
        }
        self.events.send(event).unwrap_or(0)
    }

    /// Emits a `log.entryAdded` event with the given payload.
    pub fn push_log_entry(&self, params: Value) -> usize {
        self.push(RawEvent::log_entry(params))
    }

    /// Re-emits the loaded recording in order. Returns the number of events
    /// in the recording, including ones dropped for lack of a subscription.
    pub fn replay(&self) -> usize {
        let events = self
            .recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let count = events.len();
        for event in events {
            self.push(event);
        }
        count
    }

    /// Number of events in the loaded recording.
    #[must_use]
    pub fn recording_len(&self) -> usize {
        self.recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of recorded events with the given method.
    #[must_use]
    pub fn recorded(&self, method: &str) -> usize {
        self.recording
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.method == method)
            .count()
    }

    /// True while at least one active subscription covers `event`.
    #[must_use]
    pub fn is_subscribed(&self, event: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(_, events)| events.iter().any(|e| e == event))
    }

    /// Number of subscriptions currently held open.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Marks the session as BiDi-capable or not.
    pub fn set_bidi(&self, enabled: bool) {
        self.bidi.store(enabled, Ordering::SeqCst);
    }

    /// Makes every following command fail with a `Command` error.
    pub fn set_reject_commands(&self, reject: bool) {
        self.reject_commands.store(reject, Ordering::SeqCst);
    }

    /// Every command received so far, as `(method, params)`.
    #[must_use]
    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Params of every command received with the given method.
    #[must_use]
    pub fn commands_named(&self, method: &str) -> Vec<Value> {
        self.commands()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params)
            .collect()
    }
}

impl ReplaySession {
    fn open_subscription(&self, params: &Value) -> Value {
        let id = self
            .next_subscription
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id.clone(), string_list(&params["events"])));
        json!({ "subscription": id })
    }

    fn release_subscriptions(&self, params: &Value) -> Result<Value> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(ids) = params.get("subscriptions") {
            let ids = string_list(ids);
            if let Some(unknown) = ids
                .iter()
                .find(|id| !subscriptions.iter().any(|(known, _)| known == *id))
            {
                return Err(InspectorError::Command {
                    method: SESSION_UNSUBSCRIBE.to_string(),
                    message: format!("no such subscription: {unknown}"),
                });
            }
            subscriptions.retain(|(id, _)| !ids.contains(id));
        } else {
            // Legacy form: drop the events from every subscription.
            let events = string_list(&params["events"]);
            for (_, subscribed) in subscriptions.iter_mut() {
                subscribed.retain(|e| !events.contains(e));
            }
            subscriptions.retain(|(_, subscribed)| !subscribed.is_empty());
        }
        Ok(json!({}))
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Default for ReplaySession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for ReplaySession {
    fn supports_bidi(&self) -> bool {
        self.bidi.load(Ordering::SeqCst)
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((method.to_string(), params.clone()));

        if self.reject_commands.load(Ordering::SeqCst) {
            return Err(InspectorError::Command {
                method: method.to_string(),
                message: "rejected by replay session".to_string(),
            });
        }

        match method {
            SESSION_SUBSCRIBE => Ok(self.open_subscription(&params)),
            SESSION_UNSUBSCRIBE => self.release_subscriptions(&params),
            _ => Ok(json!({})),
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RawEvent> {
        self.events.subscribe()
    }
}

/// Parses a JSONL recording into raw events.
///
/// # Errors
///
/// Returns `MalformedEvent` naming the first invalid line (1-based).
pub fn parse_jsonl(content: &str) -> Result<Vec<RawEvent>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<RawEvent>(line).map_err(|e| {
                InspectorError::malformed(format!("line {}: {e}", index + 1))
            })
        })
        .collect()
}
