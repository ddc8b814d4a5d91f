//! # bidi-log
//!
//! Log inspection over the WebDriver BiDi protocol.
//!
//! A [`LogInspector`] attaches to a BiDi-capable [`Session`], subscribes to
//! `log.entryAdded` once, normalizes every payload into a [`LogEntry`] and
//! fans it out to the callbacks registered for its category, in arrival
//! order, honoring each registration's [`Filter`].
//!
//! ## Architecture
//!
//! - **Session**: the seam to the browser. [`WebSocketSession`] speaks BiDi
//!   over a WebSocket, [`CdpBridgeSession`] adapts a local Chrome tab, and
//!   [`ReplaySession`] replays recorded events from memory or JSONL.
//! - **EventChannel**: one event pump per consumer, owning its own protocol
//!   subscription per event name and releasing it by id.
//! - **normalize**: raw payload to [`LogEntry`].
//! - **Registry**: per-category callback lists with filter evaluation and
//!   panic isolation.
//! - **LogCapture** / **WaitConfig**: collecting entries and waiting for them.
//!
//! ## Example
//!
//! ```ignore
//! use bidi_log::{FilterBy, LogCapture, LogInspector, TestBrowser, TestBrowserConfig, WaitConfig};
//!
//! #[tokio::test]
//! async fn page_logs_hello() -> Result<(), Box<dyn std::error::Error>> {
//!     let browser = TestBrowser::launch(TestBrowserConfig::default()).await?;
//!     let page = browser.new_page().await?;
//!     let inspector = LogInspector::new(page.bidi_session().await?).await?;
//!
//!     let capture = LogCapture::new();
//!     inspector
//!         .on_console_entry(capture.sink(), Some(FilterBy::log_level("info")))
//!         .await?;
//!
//!     page.navigate(HELLO_PAGE_URL).await?;
//!     page.click("#consoleLog").await?;
//!     let entry = capture.wait_for_entry(WaitConfig::default()).await?;
//!     assert_eq!(entry.text.as_deref(), Some("Hello, world!"));
//!
//!     inspector.close().await;
//!     browser.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Testing Strategy
//!
//! Unit tests and `tests/inspector.rs` run against [`ReplaySession`].
//! Tests that need Chrome are `#[ignore]`d; run them with
//! `cargo test -- --ignored`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod browser;
pub mod capture;
pub mod channel;
pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod inspector;
pub mod normalize;
pub mod page;
pub mod registry;
pub mod replay;
pub mod session;
pub mod transport;
pub mod wait;

pub use bridge::CdpBridgeSession;
pub use browser::{TestBrowser, TestBrowserConfig};
pub use capture::LogCapture;
pub use channel::{EventChannel, HandlerId, RawHandler};
pub use config::{ConnectConfig, DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use entry::{CallFrame, EntrySource, EntryType, LogEntry, LogLevel, StackTrace};
pub use error::{InspectorError, Result};
pub use filter::{Filter, FilterBy};
pub use inspector::LogInspector;
pub use normalize::{normalize, normalize_params};
pub use page::Page;
pub use registry::{Callback, Category, Registry, SubscriptionId};
pub use replay::{parse_jsonl, ReplaySession, DEFAULT_REPLAY_CAPACITY};
pub use session::{RawEvent, Session, LOG_ENTRY_ADDED, SESSION_SUBSCRIBE, SESSION_UNSUBSCRIBE};
pub use transport::WebSocketSession;
pub use wait::{wait_for, wait_for_result, WaitConfig, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
