//! Conversion of raw `log.entryAdded` payloads into `LogEntry` records.
//!
//! The payload's `type` field is the discriminator. Console entries keep
//! their method and arguments but never a stack trace; javascript entries
//! carry a stack trace only when they represent a thrown exception. Output
//! depends on the input alone, so the same payload always produces an equal
//! entry.

use crate::entry::{EntrySource, EntryType, LogEntry, LogLevel, StackTrace};
use crate::error::{InspectorError, Result};
use crate::session::{RawEvent, LOG_ENTRY_ADDED};
use serde_json::Value;

/// Normalizes a raw event into a `LogEntry`.
///
/// # Errors
///
/// Returns `MalformedEvent` if the event is not `log.entryAdded`, if the
/// payload is not an object, or if the `type` or `level` discriminators are
/// missing or not strings.
pub fn normalize(event: &RawEvent) -> Result<LogEntry> {
    if event.method != LOG_ENTRY_ADDED {
        return Err(InspectorError::malformed(format!(
            "expected '{LOG_ENTRY_ADDED}', got '{}'",
            event.method
        )));
    }
    normalize_params(&event.params)
}

/// Normalizes a bare `log.entryAdded` payload.
///
/// # Errors
///
/// See [`normalize`].
pub fn normalize_params(params: &Value) -> Result<LogEntry> {
    let object = params
        .as_object()
        .ok_or_else(|| InspectorError::malformed("payload is not an object"))?;

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .map(EntryType::from)
        .ok_or_else(|| InspectorError::malformed("missing 'type' discriminator"))?;

    let level = object
        .get("level")
        .and_then(Value::as_str)
        .map(LogLevel::from)
        .ok_or_else(|| InspectorError::malformed("missing 'level'"))?;

    let text = object.get("text").and_then(Value::as_str).map(str::to_string);
    let realm = object.get("realm").and_then(Value::as_str).map(str::to_string);
    let timestamp = object.get("timestamp").and_then(Value::as_u64).unwrap_or(0);

    let source = match object.get("source") {
        Some(value) if !value.is_null() => Some(
            serde_json::from_value::<EntrySource>(value.clone())
                .map_err(|e| InspectorError::malformed(format!("invalid 'source': {e}")))?,
        ),
        _ => None,
    };

    let (method, args, stack_trace) = match kind {
        EntryType::Console => {
            let method = object
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string);
            let args = object
                .get("args")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            (method, args, None)
        }
        EntryType::Javascript => (None, Vec::new(), parse_stack_trace(object.get("stackTrace"))?),
        EntryType::Other(_) => (None, Vec::new(), None),
    };

    Ok(LogEntry {
        kind,
        level,
        text,
        method,
        realm,
        args,
        stack_trace,
        timestamp,
        source,
    })
}

fn parse_stack_trace(value: Option<&Value>) -> Result<Option<StackTrace>> {
    match value {
        Some(value) if !value.is_null() => serde_json::from_value::<StackTrace>(value.clone())
            .map(Some)
            .map_err(|e| InspectorError::malformed(format!("invalid 'stackTrace': {e}"))),
        _ => Ok(None),
    }
}
