//! A Chrome tab that can be driven and inspected.

use crate::bridge::CdpBridgeSession;
use crate::error::{InspectorError, Result};
use crate::replay::DEFAULT_REPLAY_CAPACITY;
use crate::wait::{wait_for_result, WaitConfig};
use chromiumoxide::page::Page as ChromePage;
use std::sync::Arc;
use tracing::warn;

/// A browser tab with navigation, scripting and a BiDi log bridge.
#[derive(Debug)]
pub struct Page {
    inner: Arc<ChromePage>,
}

impl Page {
    pub(crate) fn new(page: ChromePage) -> Self {
        Self {
            inner: Arc::new(page),
        }
    }

    /// Returns a session that emits this tab's console calls and uncaught
    /// exceptions as `log.entryAdded` events.
    ///
    /// Each call installs its own listeners; attach before triggering the
    /// logs you want to see.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the runtime listeners cannot be installed.
    pub async fn bidi_session(&self) -> Result<Arc<CdpBridgeSession>> {
        let session = CdpBridgeSession::attach(self.inner.clone(), DEFAULT_REPLAY_CAPACITY).await?;
        Ok(Arc::new(session))
    }

    /// Navigates to `url` and waits until the document is complete.
    ///
    /// # Errors
    ///
    /// Returns `NavigationFailed` if loading fails, `WaitTimeout` if the
    /// document never completes.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| InspectorError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.wait_for_load(WaitConfig::default()).await
    }

    /// Waits for `document.readyState == "complete"`.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` if the document does not complete in time.
    pub async fn wait_for_load(&self, config: WaitConfig) -> Result<()> {
        wait_for_result(
            || {
                let page = self.inner.clone();
                async move {
                    let result = page
                        .evaluate("document.readyState")
                        .await
                        .map_err(|e| InspectorError::ScriptExecutionFailed(e.to_string()))?;

                    Ok(result
                        .value()
                        .and_then(|v| v.as_str())
                        .is_some_and(|s| s == "complete"))
                }
            },
            config,
            "document ready",
        )
        .await
    }

    /// Clicks the first element matching `selector`.
    ///
    /// # Errors
    ///
    /// Returns `ScriptExecutionFailed` if no element matches or the click fails.
    pub async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .inner
            .find_element(selector)
            .await
            .map_err(|e| InspectorError::ScriptExecutionFailed(format!("{selector}: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| InspectorError::ScriptExecutionFailed(format!("{selector}: {e}")))?;
        Ok(())
    }

    /// Evaluates a JavaScript expression and deserializes its value.
    ///
    /// # Errors
    ///
    /// Returns `ScriptExecutionFailed` if evaluation throws or the value has
    /// the wrong shape.
    pub async fn evaluate<T>(&self, script: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let result = self
            .inner
            .evaluate(script)
            .await
            .map_err(|e| InspectorError::ScriptExecutionFailed(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| InspectorError::ScriptExecutionFailed(e.to_string()))
    }

    /// Waits until `selector` matches an element.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` if nothing matches in time.
    pub async fn wait_for_selector(&self, selector: &str, config: WaitConfig) -> Result<()> {
        let script = selector_query(selector)?;

        wait_for_result(
            || {
                let page = self.inner.clone();
                let script = script.clone();
                async move {
                    let result = page
                        .evaluate(script.as_str())
                        .await
                        .map_err(|e| InspectorError::ScriptExecutionFailed(e.to_string()))?;
                    Ok(result
                        .value()
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false))
                }
            },
            config,
            &format!("selector '{selector}'"),
        )
        .await
    }

    /// Current `window.location.href`.
    ///
    /// # Errors
    ///
    /// Returns `ScriptExecutionFailed` if evaluation fails.
    pub async fn url(&self) -> Result<String> {
        self.evaluate("window.location.href").await
    }

    /// Current `document.title`.
    ///
    /// # Errors
    ///
    /// Returns `ScriptExecutionFailed` if evaluation fails.
    pub async fn title(&self) -> Result<String> {
        self.evaluate("document.title").await
    }

    /// Closes the tab.
    ///
    /// Bridge sessions hold the tab too; while any is alive the tab stays
    /// open until the browser closes.
    ///
    /// # Errors
    ///
    /// Returns `ChromiumOxide` if the close command fails.
    pub async fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(page) => {
                page.close().await?;
                Ok(())
            }
            Err(_) => {
                warn!("Page::close() with live bridge sessions; tab closes with the browser");
                Ok(())
            }
        }
    }
}

/// Builds `!!document.querySelector("<selector>")` with the selector JSON-escaped.
fn selector_query(selector: &str) -> Result<String> {
    let escaped = serde_json::to_string(selector)?;
    Ok(format!("!!document.querySelector({escaped})"))
}
