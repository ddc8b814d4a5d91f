//! BiDi-shaped log events from a Chrome page driven over CDP.
//!
//! `CdpBridgeSession` listens to `Runtime.consoleAPICalled` and
//! `Runtime.exceptionThrown` on a chromiumoxide page and re-emits them as
//! `log.entryAdded` payloads following the BiDi log module, so the inspector
//! can run against a locally launched Chrome without a WebDriver server.
//!
//! Console method to level mapping: `log`/`info` are `info`, `warn` is
//! `warn`, `error`/`assert` are `error`, `debug`/`trace` are `debug`.

use crate::error::{InspectorError, Result};
use crate::session::{RawEvent, Session, SESSION_SUBSCRIBE, SESSION_UNSUBSCRIBE};
use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::{
    EnableParams, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::Page as ChromePage;
use futures::StreamExt;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A `Session` fed by CDP runtime events of one page.
pub struct CdpBridgeSession {
    events: broadcast::Sender<RawEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_subscription: AtomicU64,
}

impl CdpBridgeSession {
    /// Starts listening on the page.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the CDP listeners cannot be installed.
    pub(crate) async fn attach(page: Arc<ChromePage>, capacity: usize) -> Result<Self> {
        let connection_error =
            |e: chromiumoxide::error::CdpError| InspectorError::Connection(e.to_string());

        page.execute(EnableParams::default())
            .await
            .map_err(connection_error)?;
        let mut console = page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(connection_error)?;
        let mut exceptions = page
            .event_listener::<EventExceptionThrown>()
            .await
            .map_err(connection_error)?;

        let (events, _) = broadcast::channel(capacity.max(1));

        let console_task = {
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(event) = console.next().await {
                    match serde_json::to_value(event.as_ref()) {
                        Ok(cdp) => {
                            let _ = events.send(RawEvent::log_entry(console_params(&cdp)));
                        }
                        Err(e) => warn!("failed to encode console event: {e}"),
                    }
                }
            })
        };

        let exception_task = {
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(event) = exceptions.next().await {
                    match serde_json::to_value(event.as_ref()) {
                        Ok(cdp) => {
                            let _ = events.send(RawEvent::log_entry(exception_params(&cdp)));
                        }
                        Err(e) => warn!("failed to encode exception event: {e}"),
                    }
                }
            })
        };

        debug!("CDP bridge attached");
        Ok(Self {
            events,
            tasks: Mutex::new(vec![console_task, exception_task]),
            next_subscription: AtomicU64::new(1),
        })
    }

    /// Stops forwarding events.
    pub fn detach(&self) {
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl Session for CdpBridgeSession {
    async fn send_command(&self, method: &str, _params: Value) -> Result<Value> {
        match method {
            // CDP delivers runtime events unconditionally once enabled;
            // subscription ids here are bookkeeping only.
            SESSION_SUBSCRIBE => {
                let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
                Ok(json!({ "subscription": id.to_string() }))
            }
            SESSION_UNSUBSCRIBE => Ok(json!({})),
            other => Err(InspectorError::UnsupportedCommand(other.to_string())),
        }
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RawEvent> {
        self.events.subscribe()
    }
}

impl fmt::Debug for CdpBridgeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpBridgeSession")
            .field("receivers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}

impl Drop for CdpBridgeSession {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Maps a CDP console method name to its BiDi spelling.
fn console_method(cdp_type: &str) -> &str {
    match cdp_type {
        "warning" => "warn",
        "startGroup" => "group",
        "startGroupCollapsed" => "groupCollapsed",
        "endGroup" => "groupEnd",
        other => other,
    }
}

/// BiDi level for a console method.
fn console_level(method: &str) -> &'static str {
    match method {
        "error" | "assert" => "error",
        "warn" => "warn",
        "debug" | "trace" => "debug",
        _ => "info",
    }
}

/// Converts `Runtime.consoleAPICalled` JSON into `log.entryAdded` params.
pub(crate) fn console_params(cdp: &Value) -> Value {
    let method = console_method(cdp["type"].as_str().unwrap_or("log"));
    let args = cdp["args"].as_array().cloned().unwrap_or_default();
    let text = args.iter().map(arg_text).collect::<Vec<_>>().join(" ");

    json!({
        "type": "console",
        "method": method,
        "level": console_level(method),
        "text": text,
        "args": args.iter().map(remote_value).collect::<Vec<_>>(),
        "timestamp": timestamp(&cdp["timestamp"]),
        "source": {
            "realm": realm(&cdp["executionContextId"]),
            "context": cdp["context"].as_str(),
        },
        "stackTrace": stack_trace(&cdp["stackTrace"]),
    })
}

/// Converts `Runtime.exceptionThrown` JSON into `log.entryAdded` params.
///
/// The text is the first line of the exception description (for example
/// `Error: Not working`), falling back to the CDP summary text.
pub(crate) fn exception_params(cdp: &Value) -> Value {
    let details = &cdp["exceptionDetails"];
    let text = details["exception"]["description"]
        .as_str()
        .and_then(|d| d.lines().next())
        .or_else(|| details["text"].as_str())
        .unwrap_or_default();

    json!({
        "type": "javascript",
        "level": "error",
        "text": text,
        "timestamp": timestamp(&cdp["timestamp"]),
        "source": {
            "realm": realm(&details["executionContextId"]),
            "context": Value::Null,
        },
        "stackTrace": stack_trace(&details["stackTrace"]),
    })
}

fn arg_text(arg: &Value) -> String {
    match &arg["value"] {
        Value::String(s) => s.clone(),
        Value::Null => {
            if arg["subtype"] == "null" {
                "null".to_string()
            } else if arg["type"] == "undefined" {
                "undefined".to_string()
            } else {
                arg["description"]
                    .as_str()
                    .or_else(|| arg["unserializableValue"].as_str())
                    .unwrap_or("<object>")
                    .to_string()
            }
        }
        other => other.to_string(),
    }
}

fn remote_value(arg: &Value) -> Value {
    if arg["subtype"] == "null" {
        return json!({ "type": "null" });
    }
    let kind = arg["type"].as_str().unwrap_or("object");
    match &arg["value"] {
        Value::Null => json!({ "type": kind }),
        value => json!({ "type": kind, "value": value }),
    }
}

fn stack_trace(cdp: &Value) -> Value {
    let frames: Vec<Value> = cdp["callFrames"]
        .as_array()
        .map(|frames| {
            frames
                .iter()
                .map(|f| {
                    json!({
                        "functionName": f["functionName"].as_str().unwrap_or_default(),
                        "url": f["url"].as_str().unwrap_or_default(),
                        "lineNumber": f["lineNumber"].as_u64().unwrap_or(0),
                        "columnNumber": f["columnNumber"].as_u64().unwrap_or(0),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    json!({ "callFrames": frames })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn timestamp(value: &Value) -> u64 {
    value.as_f64().map_or(0, |ms| ms.max(0.0) as u64)
}

fn realm(value: &Value) -> Value {
    value
        .as_i64()
        .map_or(Value::Null, |id| Value::String(id.to_string()))
}
