//! End-to-end inspector behavior against a replayed session.

use bidi_log::{
    EntryType, FilterBy, InspectorError, LogCapture, LogInspector, LogLevel, ReplaySession,
    Session, WaitConfig, LOG_ENTRY_ADDED, SESSION_SUBSCRIBE, SESSION_UNSUBSCRIBE,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

fn quick() -> WaitConfig {
    WaitConfig::new(Duration::from_secs(2), Duration::from_millis(5))
}

fn console_hello() -> Value {
    json!({
        "type": "console",
        "method": "log",
        "level": "info",
        "text": "Hello, world!",
        "args": [{"type": "string", "value": "Hello, world!"}],
        "timestamp": 1_700_000_000_000u64,
        "source": {"realm": "realm-1", "context": "ctx-1"}
    })
}

fn not_working() -> Value {
    json!({
        "type": "javascript",
        "level": "error",
        "text": "Error: Not working",
        "timestamp": 1_700_000_000_100u64,
        "stackTrace": {"callFrames": [
            {"functionName": "createError", "url": "page.html", "lineNumber": 12, "columnNumber": 14},
            {"functionName": "throwError", "url": "page.html", "lineNumber": 16, "columnNumber": 8},
            {"functionName": "", "url": "page.html", "lineNumber": 20, "columnNumber": 6}
        ]}
    })
}

async fn inspector_on(session: &Arc<ReplaySession>) -> LogInspector {
    assert_ok!(LogInspector::new(session.clone()).await)
}

#[tokio::test]
async fn console_entry_is_delivered_with_all_fields() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let capture = LogCapture::new();
    assert_ok!(inspector.on_console_entry(capture.sink(), None).await);

    session.push_log_entry(console_hello());

    let entry = assert_ok!(capture.wait_for_entry(quick()).await);
    assert_eq!(entry.kind, EntryType::Console);
    assert_eq!(entry.level, LogLevel::Info);
    assert_eq!(entry.text.as_deref(), Some("Hello, world!"));
    assert_eq!(entry.method.as_deref(), Some("log"));
    assert_eq!(entry.realm, None);
    assert!(entry.stack_trace.is_none());
    assert_eq!(entry.args.len(), 1);

    inspector.close().await;
}

#[tokio::test]
async fn exception_carries_its_stack_trace() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let exceptions = LogCapture::new();
    let logs = LogCapture::new();
    assert_ok!(inspector.on_javascript_exception(exceptions.sink(), None).await);
    assert_ok!(inspector.on_javascript_log(logs.sink(), None).await);

    session.push_log_entry(not_working());

    let entry = assert_ok!(exceptions.wait_for_entry(quick()).await);
    assert_eq!(entry.kind, EntryType::Javascript);
    assert_eq!(entry.text.as_deref(), Some("Error: Not working"));
    let frames = entry.stack_trace.map(|s| s.call_frames).unwrap_or_default();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].function_name, "createError");

    // Give the pump a chance to misroute before checking the log bucket.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(logs.is_empty());
}

#[tokio::test]
async fn javascript_log_without_stack_is_not_an_exception() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let logs = LogCapture::new();
    let exceptions = LogCapture::new();
    assert_ok!(inspector.on_javascript_log(logs.sink(), None).await);
    assert_ok!(inspector.on_javascript_exception(exceptions.sink(), None).await);

    session.push_log_entry(json!({"type": "javascript", "level": "warn", "text": "deprecated"}));

    let entry = assert_ok!(logs.wait_for_entry(quick()).await);
    assert_eq!(entry.level, LogLevel::Warning);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(exceptions.is_empty());
}

#[tokio::test]
async fn level_filter_that_never_matches_never_fires() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let filtered = LogCapture::new();
    let all = LogCapture::new();
    assert_ok!(
        inspector
            .on_console_entry(filtered.sink(), Some(FilterBy::log_level("error")))
            .await
    );
    assert_ok!(inspector.on_console_entry(all.sink(), None).await);

    session.push_log_entry(console_hello());

    assert_ok!(all.wait_for_count(1, quick()).await);
    assert!(filtered.is_empty());
}

#[tokio::test]
async fn level_filter_matches_exactly() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let capture = LogCapture::new();
    assert_ok!(
        inspector
            .on_log(capture.sink(), Some(FilterBy::log_level(LogLevel::Error)))
            .await
    );

    session.push_log_entry(console_hello());
    session.push_log_entry(not_working());

    let entry = assert_ok!(capture.wait_for_entry(quick()).await);
    assert_eq!(entry.level, LogLevel::Error);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(capture.len(), 1);
}

#[tokio::test]
async fn two_consumers_receive_same_entry_in_registration_order() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second"] {
        let order = order.clone();
        assert_ok!(
            inspector
                .on_console_entry(
                    move |entry| {
                        order
                            .lock()
                            .unwrap()
                            .push((name, entry.text_or_empty().to_string()));
                    },
                    None,
                )
                .await
        );
    }

    session.push_log_entry(console_hello());

    let seen = order.clone();
    assert_ok!(
        bidi_log::wait_for(
            || {
                let seen = seen.clone();
                async move { seen.lock().unwrap().len() == 2 }
            },
            quick(),
            "both consumers",
        )
        .await
    );
    assert_eq!(
        *order.lock().unwrap(),
        vec![
            ("first", "Hello, world!".to_string()),
            ("second", "Hello, world!".to_string())
        ]
    );
}

#[tokio::test]
async fn any_category_sees_every_type_in_arrival_order() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let capture = LogCapture::new();
    assert_ok!(inspector.on_log(capture.sink(), None).await);

    session.push_log_entry(console_hello());
    session.push_log_entry(not_working());
    session.push_log_entry(json!({"type": "network", "level": "debug", "text": "other"}));

    assert_ok!(capture.wait_for_count(3, quick()).await);
    let kinds: Vec<String> = capture
        .entries()
        .iter()
        .map(|e| e.kind.as_str().to_string())
        .collect();
    assert_eq!(kinds, vec!["console", "javascript", "network"]);
}

#[tokio::test]
async fn close_stops_delivery_and_releases_subscription() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let capture = LogCapture::new();
    assert_ok!(inspector.on_console_entry(capture.sink(), None).await);

    inspector.close().await;
    session.push_log_entry(console_hello());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(capture.is_empty());
    let released = session.commands_named(SESSION_UNSUBSCRIBE);
    assert_eq!(released.len(), 1);
    assert!(released[0].get("subscriptions").is_some(), "{released:?}");
    assert_eq!(session.active_subscriptions(), 0);
    assert!(matches!(
        inspector.on_console_entry(|_| {}, None).await,
        Err(InspectorError::AlreadyClosed)
    ));
}

#[tokio::test]
async fn close_without_registrations_is_harmless() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    inspector.close().await;
    inspector.close().await;
    assert!(inspector.is_closed());
    assert!(session.commands_named(SESSION_SUBSCRIBE).is_empty());
}

#[tokio::test]
async fn panicking_callback_does_not_starve_others() {
    let session = Arc::new(ReplaySession::new());
    let inspector = inspector_on(&session).await;
    let capture = LogCapture::new();
    assert_ok!(
        inspector
            .on_console_entry(|_| panic!("consumer bug"), None)
            .await
    );
    assert_ok!(inspector.on_console_entry(capture.sink(), None).await);

    session.push_log_entry(console_hello());
    session.push_log_entry(console_hello());

    assert_ok!(capture.wait_for_count(2, quick()).await);
    assert_eq!(inspector.callback_failures(), 2);
}

#[tokio::test]
async fn inspectors_on_one_session_are_independent() {
    let session = Arc::new(ReplaySession::new());
    let first = inspector_on(&session).await;
    let second = inspector_on(&session).await;
    let a = LogCapture::new();
    let b = LogCapture::new();
    assert_ok!(first.on_console_entry(a.sink(), None).await);
    assert_ok!(second.on_console_entry(b.sink(), None).await);

    first.close().await;
    assert!(session.is_subscribed(LOG_ENTRY_ADDED));
    session.push_log_entry(console_hello());

    assert_ok!(b.wait_for_entry(quick()).await);
    assert!(a.is_empty());
}

#[tokio::test]
async fn closing_every_inspector_releases_every_subscription() {
    let session = Arc::new(ReplaySession::new());
    let first = inspector_on(&session).await;
    let second = inspector_on(&session).await;
    assert_ok!(first.on_log(|_| {}, None).await);
    assert_ok!(second.on_log(|_| {}, None).await);
    assert_eq!(session.active_subscriptions(), 2);

    second.close().await;
    assert!(session.is_subscribed(LOG_ENTRY_ADDED));
    first.close().await;
    assert!(!session.is_subscribed(LOG_ENTRY_ADDED));
    assert_eq!(session.push_log_entry(console_hello()), 0);
}

#[tokio::test]
async fn non_bidi_session_is_rejected() {
    let session = Arc::new(ReplaySession::new());
    session.set_bidi(false);
    assert!(!session.supports_bidi());

    let err = LogInspector::new(session).await.unwrap_err();
    assert!(matches!(err, InspectorError::Connection(_)));
}

#[tokio::test]
async fn recorded_session_replays_through_inspector() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    let lines = [
        json!({"method": "log.entryAdded", "params": console_hello()}),
        json!({"method": "browsingContext.load", "params": {}}),
        json!({"method": "log.entryAdded", "params": not_working()}),
    ];
    let content: Vec<String> = lines.iter().map(Value::to_string).collect();
    std::fs::write(&path, content.join("\n")).unwrap();

    let session = Arc::new(assert_ok!(ReplaySession::from_jsonl(&path).await));
    let inspector = inspector_on(&session).await;
    let capture = LogCapture::new();
    assert_ok!(inspector.on_log(capture.sink(), None).await);

    assert_eq!(session.replay(), 3);
    assert_ok!(capture.wait_for_count(2, quick()).await);
    assert!(capture.entries()[1].is_exception());
}
