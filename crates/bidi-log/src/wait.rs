//! Wait conditions for asynchronous log delivery and page state.
//!
//! Log entries arrive on a background task, so anything that observes them
//! (a test assertion, a CLI waiting for the first match) has to suspend
//! until they plausibly arrived. These helpers poll a condition at a fixed
//! interval until it holds or a timeout expires.

use crate::error::{InspectorError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Default timeout for wait operations (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default poll interval for checking conditions (50ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for wait operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Maximum time to wait for the condition.
    pub timeout: Duration,

    /// How often to check if the condition is satisfied.
    pub poll_interval: Duration,
}

impl WaitConfig {
    /// Creates a new wait configuration.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// Creates a config with custom timeout and default poll interval.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Waits for a condition to become true, with timeout.
///
/// The condition is checked once before any sleeping, so an already
/// satisfied condition returns immediately.
///
/// # Errors
///
/// Returns `WaitTimeout` naming `description` when the timeout expires.
pub async fn wait_for<F, Fut>(condition: F, config: WaitConfig, description: &str) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();

    loop {
        if condition().await {
            return Ok(());
        }

        if start.elapsed() >= config.timeout {
            return Err(InspectorError::WaitTimeout {
                condition: description.to_string(),
                timeout: config.timeout,
            });
        }

        sleep(config.poll_interval).await;
    }
}

/// Waits for a condition that returns a `Result<bool>`.
///
/// Errors from the condition are treated as "not yet" (a page may still be
/// loading), so only the timeout ends the wait unsuccessfully.
///
/// # Errors
///
/// Returns `WaitTimeout` naming `description` when the timeout expires.
pub async fn wait_for_result<F, Fut>(
    condition: F,
    config: WaitConfig,
    description: &str,
) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    wait_for(
        || {
            let pending = condition();
            async move { matches!(pending.await, Ok(true)) }
        },
        config,
        description,
    )
    .await
}
