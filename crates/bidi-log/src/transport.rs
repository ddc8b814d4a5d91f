//! WebSocket transport for a live BiDi session.
//!
//! Commands go out as `{id, method, params}` text frames and are matched to
//! their `success`/`error` responses by id. Frames of type `event` are
//! broadcast to every receiver handed out by `subscribe_events`. A reader
//! and a writer task own the two halves of the socket.

use crate::config::ConnectConfig;
use crate::error::{InspectorError, Result};
use crate::session::{RawEvent, Session};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, warn};

type Reply = std::result::Result<Value, InspectorError>;
type Pending = Arc<Mutex<HashMap<u64, (String, oneshot::Sender<Reply>)>>>;

/// Outbound command frame.
#[derive(Debug, Serialize)]
struct CommandFrame<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

/// Inbound frame, discriminated by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum IncomingFrame {
    Success {
        id: u64,
        #[serde(default)]
        result: Value,
    },
    Error {
        #[serde(default)]
        id: Option<u64>,
        error: String,
        #[serde(default)]
        message: String,
    },
    Event {
        method: String,
        #[serde(default)]
        params: Value,
    },
}

/// A BiDi session over a WebSocket connection.
pub struct WebSocketSession {
    url: String,
    write_tx: mpsc::Sender<WsMessage>,
    pending: Pending,
    events: broadcast::Sender<RawEvent>,
    next_id: AtomicU64,
    command_timeout: Duration,
    closed: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebSocketSession {
    /// Connects to a BiDi WebSocket endpoint.
    ///
    /// When `config.new_session` is set, a `session.new` command is sent
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the handshake fails or times out, or if the
    /// endpoint refuses `session.new`.
    pub async fn connect(url: &str, config: &ConnectConfig) -> Result<Self> {
        debug!(url, "connecting to BiDi endpoint");

        let ws = match tokio::time::timeout(
            config.connect_timeout(),
            tokio_tungstenite::connect_async(url),
        )
        .await
        {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => {
                return Err(InspectorError::Connection(format!(
                    "WebSocket connect to '{url}' failed: {e}"
                )));
            }
            Err(_) => {
                return Err(InspectorError::Connection(format!(
                    "WebSocket handshake with '{url}' timed out after {:?}",
                    config.connect_timeout()
                )));
            }
        };

        let (mut write, mut read) = ws.split();
        let (write_tx, mut write_rx) = mpsc::channel::<WsMessage>(256);
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(message) = write_rx.recv().await {
                if let Err(e) = write.send(message).await {
                    warn!("BiDi write failed: {e}");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader = {
            let pending = pending.clone();
            let events = events.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => route_frame(&text, &pending, &events),
                        Ok(WsMessage::Close(_)) => {
                            debug!("BiDi endpoint closed the connection");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("BiDi read failed: {e}");
                            break;
                        }
                    }
                }
                closed.store(true, Ordering::SeqCst);
                fail_pending(&pending);
            })
        };

        let session = Self {
            url: url.to_string(),
            write_tx,
            pending,
            events,
            next_id: AtomicU64::new(1),
            command_timeout: config.command_timeout(),
            closed,
            tasks: Mutex::new(vec![reader, writer]),
        };

        if config.new_session {
            session
                .send_command("session.new", json!({ "capabilities": {} }))
                .await
                .map_err(|e| InspectorError::Connection(format!("session.new failed: {e}")))?;
        }

        debug!(url, "BiDi session ready");
        Ok(session)
    }

    /// The endpoint this session is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true once the connection has ended or `close` was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the connection and fails outstanding commands. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
        fail_pending(&self.pending);
        debug!(url = %self.url, "BiDi session closed");
    }
}

#[async_trait]
impl Session for WebSocketSession {
    fn supports_bidi(&self) -> bool {
        !self.is_closed()
    }

    async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(InspectorError::AlreadyClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let json = serde_json::to_string(&CommandFrame { id, method, params })?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, (method.to_string(), tx));

        if self.write_tx.send(WsMessage::Text(json.into())).await.is_err() {
            self.forget(id);
            return Err(InspectorError::AlreadyClosed);
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(InspectorError::AlreadyClosed),
            Err(_) => {
                self.forget(id);
                Err(InspectorError::Timeout {
                    operation: format!("command '{method}'"),
                    timeout: self.command_timeout,
                })
            }
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RawEvent> {
        self.events.subscribe()
    }
}

impl WebSocketSession {
    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

impl fmt::Debug for WebSocketSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("url", &self.url)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Routes one inbound text frame to a pending command or the event stream.
fn route_frame(text: &str, pending: &Pending, events: &broadcast::Sender<RawEvent>) {
    let frame = match serde_json::from_str::<IncomingFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("ignoring unrecognized BiDi frame: {e}");
            return;
        }
    };

    match frame {
        IncomingFrame::Success { id, result } => {
            if let Some((_, tx)) = take_pending(pending, id) {
                let _ = tx.send(Ok(result));
            }
        }
        IncomingFrame::Error { id, error, message } => match id.and_then(|id| take_pending(pending, id)) {
            Some((method, tx)) => {
                let _ = tx.send(Err(InspectorError::Command {
                    method,
                    message: format!("{error}: {message}"),
                }));
            }
            None => warn!(error = %error, "BiDi error without a pending command: {message}"),
        },
        IncomingFrame::Event { method, params } => {
            // No receivers simply means nobody is listening yet.
            let _ = events.send(RawEvent { method, params });
        }
    }
}

fn take_pending(pending: &Pending, id: u64) -> Option<(String, oneshot::Sender<Reply>)> {
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id)
}

fn fail_pending(pending: &Pending) {
    let drained: Vec<_> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    for (_, (_, tx)) in drained {
        let _ = tx.send(Err(InspectorError::AlreadyClosed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Pending, broadcast::Sender<RawEvent>, broadcast::Receiver<RawEvent>) {
        let (events, rx) = broadcast::channel(16);
        (Arc::new(Mutex::new(HashMap::new())), events, rx)
    }

    #[test]
    fn command_frame_shape() {
        let frame = CommandFrame {
            id: 3,
            method: "session.subscribe",
            params: json!({"events": ["log.entryAdded"]}),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["method"], "session.subscribe");
        assert_eq!(value["params"]["events"][0], "log.entryAdded");
    }

    #[tokio::test]
    async fn success_frame_resolves_pending_command() {
        let (pending, events, _rx) = setup();
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(7, ("session.status".into(), tx));

        route_frame(r#"{"type":"success","id":7,"result":{"ready":true}}"#, &pending, &events);

        let reply = rx.await.unwrap().unwrap();
        assert_eq!(reply["ready"], true);
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_frame_names_the_method() {
        let (pending, events, _rx) = setup();
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(1, ("session.subscribe".into(), tx));

        route_frame(
            r#"{"type":"error","id":1,"error":"invalid argument","message":"bad event"}"#,
            &pending,
            &events,
        );

        match rx.await.unwrap() {
            Err(InspectorError::Command { method, message }) => {
                assert_eq!(method, "session.subscribe");
                assert_eq!(message, "invalid argument: bad event");
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn event_frame_is_broadcast() {
        let (pending, events, mut rx) = setup();
        route_frame(
            r#"{"type":"event","method":"log.entryAdded","params":{"type":"console","level":"info"}}"#,
            &pending,
            &events,
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.method, "log.entryAdded");
        assert_eq!(event.params["level"], "info");
    }

    #[tokio::test]
    async fn garbage_and_unknown_ids_are_ignored() {
        let (pending, events, mut rx) = setup();
        route_frame("not json", &pending, &events);
        route_frame(r#"{"type":"success","id":99,"result":{}}"#, &pending, &events);
        route_frame(r#"{"type":"error","id":null,"error":"unknown error","message":""}"#, &pending, &events);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fail_pending_releases_waiters() {
        let (pending, _events, _rx) = setup();
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(1, ("x".into(), tx));

        fail_pending(&pending);
        assert!(matches!(rx.await.unwrap(), Err(InspectorError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn connect_to_unreachable_endpoint_is_connection_error() {
        let config = ConnectConfig {
            connect_timeout_ms: 500,
            ..ConnectConfig::default()
        };
        let err = WebSocketSession::connect("ws://127.0.0.1:1/session", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, InspectorError::Connection(_)));
    }
}
