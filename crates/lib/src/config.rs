//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.companion/config.json`) and environment.
//! Every field has a default, so a missing file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where the wellbeing agent endpoint lives.
    #[serde(default)]
    pub backend: BackendConfig,

    /// History and auto-trigger tuning.
    #[serde(default)]
    pub session: SessionConfig,

    /// User-visible error strings.
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Backend location and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the managed backend. Overridden by COMPANION_BASE_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the streaming agent endpoint (default "/api/ai/wellbeing-agent").
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token sent as `Authorization`. Overridden by COMPANION_API_TOKEN env.
    pub api_token: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:54321".to_string()
}

fn default_endpoint() -> String {
    "/api/ai/wellbeing-agent".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoint: default_endpoint(),
            api_token: None,
        }
    }
}

impl BackendConfig {
    /// Full endpoint URL (base URL without trailing slash + endpoint path).
    pub fn endpoint_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.endpoint.trim();
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// How many recent non-empty messages go out as history (default 6).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Quiet period before a check-in change triggers an update turn (default 2000 ms).
    #[serde(default = "default_checkin_debounce_ms")]
    pub checkin_debounce_ms: u64,
}

fn default_history_limit() -> usize {
    6
}

fn default_checkin_debounce_ms() -> u64 {
    2000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            checkin_debounce_ms: default_checkin_debounce_ms(),
        }
    }
}

impl SessionConfig {
    pub fn checkin_debounce(&self) -> Duration {
        Duration::from_millis(self.checkin_debounce_ms)
    }
}

/// Strings shown to the user when a turn fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesConfig {
    #[serde(default = "default_rate_limited")]
    pub rate_limited: String,

    #[serde(default = "default_request_failed")]
    pub request_failed: String,
}

fn default_rate_limited() -> String {
    "You're sending messages a little quickly. Please wait a moment and try again.".to_string()
}

fn default_request_failed() -> String {
    "Something went wrong reaching your companion. Please try again.".to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            rate_limited: default_rate_limited(),
            request_failed: default_request_failed(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the base URL: env COMPANION_BASE_URL overrides config.
pub fn resolve_base_url(config: &Config) -> String {
    non_empty_env("COMPANION_BASE_URL").unwrap_or_else(|| config.backend.base_url.clone())
}

/// Resolve the API token: env COMPANION_API_TOKEN overrides config.
pub fn resolve_api_token(config: &Config) -> Option<String> {
    non_empty_env("COMPANION_API_TOKEN").or_else(|| {
        config
            .backend
            .api_token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("COMPANION_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".companion").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path. Missing file => default config.
/// Env overrides for base URL and token are applied to the returned config.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    config.backend.base_url = resolve_base_url(&config);
    config.backend.api_token = resolve_api_token(&config);
    Ok((config, path))
}
