//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.devlink/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level connector config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Signaling server location and duplex handshake settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Backoff bounds for the polling transport.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Signaling server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Base HTTP(S) URL of the signaling server. Overridden by DEVLINK_SERVER_URL env.
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Path of the WebSocket endpoint on the same host (default "/connect_client").
    #[serde(default = "default_duplex_path")]
    pub duplex_path: String,

    /// Upper bound for the WebSocket handshake before falling back to polling.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// Poll loop delay bounds: reset to min when messages arrive, doubled up to max otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Upper bound for one messages request; a stalled poll counts as a failed one.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:1080".to_string()
}

fn default_duplex_path() -> String {
    "/connect_client".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_min_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_poll_timeout_ms() -> u64 {
    30_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            duplex_path: default_duplex_path(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl PollingConfig {
    /// At least 1ms: a zero delay would never grow and the loop would spin.
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms.max(1))
    }

    /// Never below the min delay, so a misconfigured file cannot invert the bounds.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms).max(self.min_delay())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }
}

/// Resolve the server base URL: env DEVLINK_SERVER_URL overrides config. Trailing '/' is stripped.
pub fn resolve_server_url(config: &Config) -> String {
    std::env::var("DEVLINK_SERVER_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .unwrap_or_else(|| config.server.url.trim().to_string())
        .trim_end_matches('/')
        .to_string()
}

/// WebSocket URL for the duplex endpoint: http -> ws, https -> wss, plus `duplex_path`.
pub fn duplex_url(base_url: &str, duplex_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    let path = duplex_path.trim();
    if path.starts_with('/') {
        format!("{}{}", ws_base, path)
    } else {
        format!("{}/{}", ws_base, path)
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("DEVLINK_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".devlink").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or DEVLINK_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
