//! Replay command implementation.
//!
//! Loads a JSONL recording into a `ReplaySession`, runs it through a
//! `LogInspector` and prints the matching entries in file order.

use crate::cli::ReplayArgs;
use crate::commands::register_printer;
use anyhow::{Context, Result};
use bidi_log::{wait_for, LogInspector, ReplaySession, WaitConfig, LOG_ENTRY_ADDED};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Execute the replay command.
///
/// # Errors
///
/// Returns an error if the recording cannot be read or parsed, or if the
/// entries are not all delivered within `--timeout-ms`.
pub async fn execute(args: ReplayArgs) -> Result<()> {
    let session = Arc::new(
        ReplaySession::from_jsonl(&args.file)
            .await
            .with_context(|| format!("failed to load recording {}", args.file.display()))?,
    );
    let expected = session.recorded(LOG_ENTRY_ADDED) as u64;

    let inspector = LogInspector::new(session.clone())
        .await
        .context("failed to attach inspector")?;
    register_printer(&inspector, &args.filter).await?;

    // Counts every delivered entry so we know when the recording is drained.
    let delivered = Arc::new(AtomicU64::new(0));
    let counter = delivered.clone();
    inspector
        .on_log(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            None,
        )
        .await
        .context("failed to subscribe")?;

    let replayed = session.replay();

    let drained = wait_for(
        || {
            let seen = delivered.load(Ordering::SeqCst) + inspector.malformed_events();
            async move { seen >= expected }
        },
        WaitConfig::new(Duration::from_millis(args.timeout_ms), Duration::from_millis(5)),
        "recording drained",
    )
    .await;

    let malformed = inspector.malformed_events();
    inspector.close().await;
    drained.context("not every recorded entry was delivered")?;

    if malformed > 0 {
        warn!(malformed, "skipped malformed log events");
    }
    info!(
        replayed,
        entries = delivered.load(Ordering::SeqCst),
        "replay finished"
    );
    Ok(())
}
