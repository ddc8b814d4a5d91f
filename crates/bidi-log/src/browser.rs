//! Local Chrome process for inspecting pages without a WebDriver server.
//!
//! `TestBrowser` launches Chrome through chromiumoxide and hands out
//! [`Page`]s. A page can then expose a [`CdpBridgeSession`](crate::bridge::CdpBridgeSession)
//! that a `LogInspector` attaches to.
//!
//! Dropping a `TestBrowser` kills the process; prefer `close()`.

use crate::error::{InspectorError, Result};
use crate::page::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Launch options for [`TestBrowser`].
#[derive(Debug, Clone)]
pub struct TestBrowserConfig {
    /// Run without a window. Defaults to true unless the `visible` feature is on.
    pub headless: bool,

    /// Extra Chrome command line arguments.
    pub args: Vec<String>,
}

impl TestBrowserConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows the browser window.
    #[must_use]
    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();

        if self.headless {
            config = config.arg("--headless");
        }

        // Parallel launches must not share a profile (ProcessSingleton lock).
        let user_data_dir =
            std::env::temp_dir().join(format!("bidi-log-chrome-{}", uuid::Uuid::new_v4()));
        config = config.arg(format!("--user-data-dir={}", user_data_dir.display()));

        for arg in &self.args {
            config = config.arg(arg.clone());
        }

        config.build().map_err(|e| InspectorError::LaunchFailed {
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })
    }
}

impl Default for TestBrowserConfig {
    fn default() -> Self {
        Self {
            headless: !cfg!(feature = "visible"),
            args: vec![
                // Containers usually lack user namespaces.
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
        }
    }
}

/// A launched Chrome instance.
///
/// ```ignore
/// let browser = TestBrowser::launch(TestBrowserConfig::default()).await?;
/// let page = browser.new_page().await?;
/// let inspector = LogInspector::new(page.bidi_session().await?).await?;
/// ```
pub struct TestBrowser {
    inner: Arc<Mutex<Option<Browser>>>,
}

impl TestBrowser {
    /// Starts Chrome and drives its CDP handler on a background task.
    ///
    /// # Errors
    ///
    /// Returns `LaunchFailed` if Chrome is missing or does not start.
    pub async fn launch(config: TestBrowserConfig) -> Result<Self> {
        debug!(?config, "launching browser");

        let browser_config = config.to_browser_config()?;
        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| InspectorError::LaunchFailed {
                    reason: "failed to launch Chrome process".to_string(),
                    source: Some(Box::new(e)),
                })?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("browser handler error: {e}");
                }
            }
        });

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(browser))),
        })
    }

    /// Opens a blank tab.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyClosed` after `close()`, `Connection` if Chrome refuses.
    pub async fn new_page(&self) -> Result<Page> {
        let browser = self.inner.lock().await;
        let browser = browser.as_ref().ok_or(InspectorError::AlreadyClosed)?;

        let chrome_page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| InspectorError::Connection(e.to_string()))?;

        Ok(Page::new(chrome_page))
    }

    /// Closes Chrome gracefully.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the close command fails.
    pub async fn close(self) -> Result<()> {
        if let Some(mut browser) = self.inner.lock().await.take() {
            debug!("closing browser");
            browser
                .close()
                .await
                .map_err(|e| InspectorError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    /// Returns true once `close()` has run.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

impl Drop for TestBrowser {
    fn drop(&mut self) {
        // chromiumoxide's Browser::drop kills the process if it is still held.
        if let Ok(guard) = self.inner.try_lock() {
            if guard.is_some() {
                warn!("TestBrowser dropped without close(); killing Chrome");
            }
        }
    }
}
