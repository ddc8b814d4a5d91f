//! Session event channel: raw event fan-out keyed by protocol event name.
//!
//! The channel owns one receiver on the session's event stream and a single
//! pump task that delivers events one at a time, in arrival order. Every
//! handler registered for an event name sees the event before the pump moves
//! on to the next one, and handlers for the same name run in registration
//! order.
//!
//! The first handler for an event name asks the browser to start sending it
//! (`session.subscribe`); the last one to go away releases that subscription
//! by the id the browser returned, leaving other channels on the same
//! session subscribed.

use crate::error::{InspectorError, Result};
use crate::session::{RawEvent, Session, SESSION_SUBSCRIBE, SESSION_UNSUBSCRIBE};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Low-level handler invoked once per raw event.
pub type RawHandler = Arc<dyn Fn(&RawEvent) + Send + Sync>;

/// Handle returned by `subscribe_raw`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct HandlerEntry {
    id: HandlerId,
    event: String,
    handler: RawHandler,
}

/// State shared between the channel and its pump task.
struct Shared {
    handlers: Mutex<Vec<HandlerEntry>>,
    closed: AtomicBool,
}

impl Shared {
    fn deliver(&self, event: &RawEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }

        let targets: Vec<RawHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| h.event == event.method)
            .map(|h| h.handler.clone())
            .collect();

        for handler in targets {
            // Events already in flight when close() runs are dropped.
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(method = %event.method, "raw event handler panicked");
            }
        }
    }
}

/// Asynchronous event channel bound to one session.
pub struct EventChannel {
    session: Arc<dyn Session>,
    shared: Arc<Shared>,
    contexts: Vec<String>,
    // Protocol subscriptions owned by this channel: event name to the id the
    // endpoint returned. Held across the command round trip.
    subscriptions: AsyncMutex<HashMap<String, Option<String>>>,
    next_id: AtomicU64,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    /// Opens a channel on the given session.
    ///
    /// Must be called from within a tokio runtime; the pump task is spawned
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the session is not BiDi-capable.
    pub fn open(session: Arc<dyn Session>) -> Result<Self> {
        Self::open_with_contexts(session, Vec::new())
    }

    /// Opens a channel whose protocol subscriptions are scoped to the given
    /// browsing contexts. An empty list subscribes globally.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the session is not BiDi-capable.
    pub fn open_with_contexts(session: Arc<dyn Session>, contexts: Vec<String>) -> Result<Self> {
        if !session.supports_bidi() {
            return Err(InspectorError::Connection(
                "session does not support BiDi events; enable BiDi when creating it".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            handlers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let receiver = session.subscribe_events();
        let pump = tokio::spawn(run_pump(receiver, shared.clone()));
        debug!("event channel opened");

        Ok(Self {
            session,
            shared,
            contexts,
            subscriptions: AsyncMutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Registers a handler for a raw protocol event name.
    ///
    /// Waits for the browser to acknowledge `session.subscribe` when this is
    /// the first handler for `event`, so an action triggered after this call
    /// returns cannot race the subscription.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close`, or the session's error if the
    /// subscribe command fails (the handler is not registered in that case).
    pub async fn subscribe_raw(&self, event: &str, handler: RawHandler) -> Result<HandlerId> {
        let mut subscriptions = self.subscriptions.lock().await;
        if self.is_closed() {
            return Err(InspectorError::AlreadyClosed);
        }

        if !subscriptions.contains_key(event) {
            let reply = self
                .session
                .send_command(SESSION_SUBSCRIBE, self.subscribe_params(event))
                .await?;
            let id = subscription_id(&reply);
            debug!(event, subscription = ?id, "subscribed to protocol event");
            subscriptions.insert(event.to_string(), id);
        }

        // close() ran while the command was in flight; it releases the
        // subscription once we drop the lock.
        if self.is_closed() {
            return Err(InspectorError::AlreadyClosed);
        }

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HandlerEntry {
                id,
                event: event.to_string(),
                handler,
            });
        Ok(id)
    }

    /// Removes a handler. Returns false if it was not registered.
    ///
    /// Removing the last handler for an event releases this channel's own
    /// protocol subscription; other channels on the session keep theirs.
    ///
    /// # Errors
    ///
    /// Returns the session's error if `session.unsubscribe` fails.
    pub async fn unsubscribe(&self, id: HandlerId) -> Result<bool> {
        let mut subscriptions = self.subscriptions.lock().await;

        let removed = {
            let mut handlers = self
                .shared
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            handlers
                .iter()
                .position(|h| h.id == id)
                .map(|pos| handlers.remove(pos).event)
        };

        let Some(event) = removed else {
            return Ok(false);
        };

        if self.has_handlers_for(&event) || self.is_closed() {
            return Ok(true);
        }
        if let Some(subscription) = subscriptions.remove(&event) {
            self.session
                .send_command(
                    SESSION_UNSUBSCRIBE,
                    self.unsubscribe_params(&event, subscription.as_deref()),
                )
                .await?;
        }
        Ok(true)
    }

    /// Releases every handler and stops the pump. Safe to call repeatedly.
    ///
    /// Only the protocol subscriptions this channel created are released.
    /// Unsubscribe commands are best-effort: failures are logged, not returned.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump {
            pump.abort();
        }

        let mut released: Vec<(String, Option<String>)> =
            self.subscriptions.lock().await.drain().collect();
        released.sort();

        for (event, subscription) in released {
            if let Err(e) = self
                .session
                .send_command(
                    SESSION_UNSUBSCRIBE,
                    self.unsubscribe_params(&event, subscription.as_deref()),
                )
                .await
            {
                warn!(event = %event, "failed to unsubscribe on close: {e}");
            }
        }
        debug!("event channel closed");
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Number of registered raw handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn has_handlers_for(&self, event: &str) -> bool {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|h| h.event == event)
    }

    fn subscribe_params(&self, event: &str) -> Value {
        if self.contexts.is_empty() {
            json!({ "events": [event] })
        } else {
            json!({ "events": [event], "contexts": self.contexts })
        }
    }

    // Without an id the endpoint predates subscription handles and only
    // supports unsubscribing by event name.
    fn unsubscribe_params(&self, event: &str, subscription: Option<&str>) -> Value {
        match subscription {
            Some(id) => json!({ "subscriptions": [id] }),
            None => self.subscribe_params(event),
        }
    }
}

/// The `subscription` handle from a `session.subscribe` reply, if any.
fn subscription_id(reply: &Value) -> Option<String> {
    reply
        .get("subscription")
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("handlers", &self.handler_count())
            .field("contexts", &self.contexts)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
    }
}

async fn run_pump(mut receiver: Receiver<RawEvent>, shared: Arc<Shared>) {
    loop {
        match receiver.recv().await {
            Ok(event) => shared.deliver(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event channel lagged; raw events were dropped");
            }
            Err(RecvError::Closed) => {
                debug!("session event stream ended");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplaySession;
    use crate::session::LOG_ENTRY_ADDED;
    use async_trait::async_trait;
    use std::time::Duration;

    fn counter() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> RawHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_for = seen.clone();
        let make = move |name: &'static str| {
            let seen = seen_for.clone();
            Arc::new(move |e: &RawEvent| {
                seen.lock().unwrap().push(format!("{name}:{}", e.params["n"]));
            }) as RawHandler
        };
        (seen, make)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn open_rejects_non_bidi_session() {
        let session = ReplaySession::new();
        session.set_bidi(false);
        let err = EventChannel::open(Arc::new(session)).unwrap_err();
        assert!(matches!(err, InspectorError::Connection(_)));
    }

    #[tokio::test]
    async fn handlers_fire_in_registration_order() {
        let session = Arc::new(ReplaySession::new());
        let channel = EventChannel::open(session.clone()).unwrap();
        let (seen, make) = counter();

        channel.subscribe_raw(LOG_ENTRY_ADDED, make("a")).await.unwrap();
        channel.subscribe_raw(LOG_ENTRY_ADDED, make("b")).await.unwrap();
        channel.subscribe_raw("browsingContext.load", make("c")).await.unwrap();

        session.push(RawEvent::log_entry(json!({"n": 1})));
        session.push(RawEvent::log_entry(json!({"n": 2})));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
        // One protocol subscription per event name.
        assert_eq!(session.commands_named(SESSION_SUBSCRIBE).len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_last_handler_unsubscribes_event() {
        let session = Arc::new(ReplaySession::new());
        let channel = EventChannel::open(session.clone()).unwrap();
        let (_, make) = counter();

        let a = channel.subscribe_raw(LOG_ENTRY_ADDED, make("a")).await.unwrap();
        let b = channel.subscribe_raw(LOG_ENTRY_ADDED, make("b")).await.unwrap();

        assert!(channel.unsubscribe(a).await.unwrap());
        assert!(session.commands_named(SESSION_UNSUBSCRIBE).is_empty());
        assert!(channel.unsubscribe(b).await.unwrap());
        let released = session.commands_named(SESSION_UNSUBSCRIBE);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0], json!({"subscriptions": ["1"]}));
        assert!(!session.is_subscribed(LOG_ENTRY_ADDED));
        assert!(!channel.unsubscribe(b).await.unwrap());
    }

    #[tokio::test]
    async fn closing_one_channel_keeps_the_other_subscribed() {
        let session = Arc::new(ReplaySession::new());
        let first = EventChannel::open(session.clone()).unwrap();
        let second = EventChannel::open(session.clone()).unwrap();
        let (seen, make) = counter();
        first.subscribe_raw(LOG_ENTRY_ADDED, make("first")).await.unwrap();
        second.subscribe_raw(LOG_ENTRY_ADDED, make("second")).await.unwrap();

        first.close().await;
        session.push(RawEvent::log_entry(json!({"n": 1})));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec!["second:1"]);
        assert_eq!(session.active_subscriptions(), 1);
    }

    /// Lets `session.unsubscribe` lose a few scheduler turns before it lands.
    struct SlowUnsubscribe(Arc<ReplaySession>);

    #[async_trait]
    impl Session for SlowUnsubscribe {
        async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
            if method == SESSION_UNSUBSCRIBE {
                for _ in 0..4 {
                    tokio::task::yield_now().await;
                }
            }
            self.0.send_command(method, params).await
        }

        fn subscribe_events(&self) -> Receiver<RawEvent> {
            self.0.subscribe_events()
        }
    }

    #[tokio::test]
    async fn resubscribe_during_unsubscribe_keeps_events_flowing() {
        let replay = Arc::new(ReplaySession::new());
        let channel = EventChannel::open(Arc::new(SlowUnsubscribe(replay.clone()))).unwrap();
        let (seen, make) = counter();
        let old = channel.subscribe_raw(LOG_ENTRY_ADDED, make("old")).await.unwrap();

        let (released, added) = tokio::join!(
            channel.unsubscribe(old),
            channel.subscribe_raw(LOG_ENTRY_ADDED, make("new")),
        );
        assert!(released.unwrap());
        added.unwrap();

        assert!(replay.is_subscribed(LOG_ENTRY_ADDED));
        replay.push(RawEvent::log_entry(json!({"n": 1})));
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec!["new:1"]);
    }

    #[tokio::test]
    async fn legacy_endpoint_without_ids_unsubscribes_by_event() {
        struct NoIds(Arc<ReplaySession>);

        #[async_trait]
        impl Session for NoIds {
            async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
                self.0.send_command(method, params).await?;
                Ok(json!({}))
            }

            fn subscribe_events(&self) -> Receiver<RawEvent> {
                self.0.subscribe_events()
            }
        }

        let replay = Arc::new(ReplaySession::new());
        let channel = EventChannel::open(Arc::new(NoIds(replay.clone()))).unwrap();
        let (_, make) = counter();
        let id = channel.subscribe_raw(LOG_ENTRY_ADDED, make("a")).await.unwrap();
        channel.unsubscribe(id).await.unwrap();

        let released = replay.commands_named(SESSION_UNSUBSCRIBE);
        assert_eq!(released, vec![json!({"events": [LOG_ENTRY_ADDED]})]);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_delivery() {
        let session = Arc::new(ReplaySession::new());
        let channel = EventChannel::open(session.clone()).unwrap();
        let (seen, make) = counter();
        channel.subscribe_raw(LOG_ENTRY_ADDED, make("a")).await.unwrap();

        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed());
        assert_eq!(channel.handler_count(), 0);

        session.push(RawEvent::log_entry(json!({"n": 1})));
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
        assert!(matches!(
            channel.subscribe_raw(LOG_ENTRY_ADDED, make("late")).await,
            Err(InspectorError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn contexts_scope_subscriptions() {
        let session = Arc::new(ReplaySession::new());
        let channel =
            EventChannel::open_with_contexts(session.clone(), vec!["ctx-1".into()]).unwrap();
        let (_, make) = counter();
        channel.subscribe_raw(LOG_ENTRY_ADDED, make("a")).await.unwrap();

        let sent = session.commands_named(SESSION_SUBSCRIBE);
        assert_eq!(sent[0]["contexts"], json!(["ctx-1"]));
        assert_eq!(sent[0]["events"], json!([LOG_ENTRY_ADDED]));
    }
}
