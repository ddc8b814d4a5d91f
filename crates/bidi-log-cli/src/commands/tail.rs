//! Tail command implementation.
//!
//! Connects to a BiDi endpoint and prints matching log entries until Ctrl-C.

use crate::cli::TailArgs;
use crate::commands::register_printer;
use anyhow::{Context, Result};
use bidi_log::{ConnectConfig, LogInspector, RawEvent, Session, WebSocketSession, LOG_ENTRY_ADDED};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Execute the tail command.
///
/// # Errors
///
/// Returns an error if configuration is invalid, no URL is available, the
/// connection fails, or the subscription is rejected.
pub async fn execute(args: TailArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let url = config
        .websocket_url
        .clone()
        .context("no WebSocket URL: pass --url or set BIDI_LOG_WEBSOCKET_URL")?;

    let session = Arc::new(
        WebSocketSession::connect(&url, &config)
            .await
            .with_context(|| format!("failed to connect to {url}"))?,
    );

    let recorder = match &args.record {
        Some(path) => Some(spawn_recorder(session.subscribe_events(), path.clone()).await?),
        None => None,
    };

    let inspector = LogInspector::with_contexts(session.clone(), config.contexts.clone())
        .await
        .context("session cannot deliver BiDi events")?;
    register_printer(&inspector, &args.filter).await?;

    info!(%url, "tailing log entries, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    inspector.close().await;
    session.close();
    if let Some(recorder) = recorder {
        recorder.abort();
    }

    let failures = inspector.callback_failures();
    let malformed = inspector.malformed_events();
    if failures > 0 || malformed > 0 {
        warn!(failures, malformed, "some events were not printed");
    }
    Ok(())
}

/// Loads configuration and applies command line overrides.
fn resolve_config(args: &TailArgs) -> Result<ConnectConfig> {
    let mut config =
        ConnectConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(url) = &args.url {
        config.websocket_url = Some(url.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Appends every raw `log.entryAdded` event to a JSONL file.
async fn spawn_recorder(
    mut events: broadcast::Receiver<RawEvent>,
    path: PathBuf,
) -> Result<JoinHandle<()>> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
        .with_context(|| format!("failed to open recording {}", path.display()))?;
    debug!(path = %path.display(), "recording raw events");

    Ok(tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) if event.method == LOG_ENTRY_ADDED => {
                    if let Err(e) = write_event(&mut file, &event).await {
                        warn!("recording stopped: {e}");
                        return;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "recorder fell behind, events missing from recording");
                }
                Err(RecvError::Closed) => return,
            }
        }
    }))
}

async fn write_event(file: &mut tokio::fs::File, event: &RawEvent) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}
