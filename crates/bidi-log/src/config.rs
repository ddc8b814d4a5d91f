//! Connection configuration with multi-source loading.
//!
//! Merges settings from a TOML file and environment variables on top of
//! built-in defaults. Priority: Environment > File > Defaults. Callers
//! (such as the CLI) apply their own overrides after loading.

use crate::error::{InspectorError, Result};
use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "bidi-log.toml";

/// Prefix for environment overrides (`BIDI_LOG_WEBSOCKET_URL`, ...).
pub const ENV_PREFIX: &str = "BIDI_LOG_";

/// Settings for connecting to a BiDi endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectConfig {
    /// WebSocket URL of the BiDi endpoint (e.g. the `webSocketUrl` capability).
    pub websocket_url: Option<String>,

    /// WebSocket handshake timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Per-command response timeout in milliseconds.
    pub command_timeout_ms: u64,

    /// Capacity of the raw event buffer per receiver.
    pub event_buffer: usize,

    /// Send `session.new` after connecting (direct browser endpoints).
    pub new_session: bool,

    /// Browsing contexts to scope subscriptions to; empty means all.
    pub contexts: Vec<String>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            websocket_url: None,
            connect_timeout_ms: 10_000,
            command_timeout_ms: 30_000,
            event_buffer: 1024,
            new_session: false,
            contexts: Vec::new(),
        }
    }
}

impl ConnectConfig {
    /// Loads configuration from defaults, an optional TOML file and the environment.
    ///
    /// When `path` is `None`, `bidi-log.toml` in the working directory is used
    /// if it exists.
    ///
    /// # Errors
    ///
    /// Returns `Config` if an explicit path does not exist or if any source
    /// holds a value of the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        match path {
            Some(path) if !path.exists() => {
                return Err(InspectorError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment
            .extract()
            .map_err(|e| InspectorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(InspectorError::Config(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(InspectorError::Config(
                "command_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(InspectorError::Config(
                "event_buffer must be greater than 0".to_string(),
            ));
        }
        match &self.websocket_url {
            Some(url) if !(url.starts_with("ws://") || url.starts_with("wss://")) => {
                Err(InspectorError::Config(format!(
                    "websocket_url must start with ws:// or wss://, got '{url}'"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Handshake timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Command timeout as a `Duration`.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
