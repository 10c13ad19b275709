//! Application-level configuration loading: API endpoint, polling cadence and rate budget.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::rate_limiter::{DEFAULT_RATE_MAX_REQUESTS, DEFAULT_RATE_WINDOW};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "EVENT_WATCH_CONFIG_PATH";
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATE_DIR: &str = "data/state";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Base URL of the remote event API (without trailing slash).
    pub api_base_url: String,
    /// Period of the background refresh tick.
    pub poll_interval: Duration,
    /// Rolling window of the shared rate limiter.
    pub rate_window: Duration,
    /// Requests allowed inside [`AppConfig::rate_window`].
    pub rate_max_requests: usize,
    /// Per-request timeout for the event API.
    pub request_timeout: Duration,
    /// Directory used by the file state store.
    pub state_dir: PathBuf,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                Self::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; absent keys keep their default value.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        let raw = serde_json::from_str::<RawConfig>(contents)?;
        let config: Self = raw.into();
        info!(
            api = %config.api_base_url,
            poll_secs = config.poll_interval.as_secs(),
            "loaded configuration"
        );
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    api_base_url: String,
    poll_interval_secs: u64,
    rate_window_ms: u64,
    rate_max_requests: usize,
    request_timeout_secs: u64,
    state_dir: PathBuf,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            rate_window_ms: DEFAULT_RATE_WINDOW.as_millis() as u64,
            rate_max_requests: DEFAULT_RATE_MAX_REQUESTS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            api_base_url: value.api_base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(value.poll_interval_secs.max(1)),
            rate_window: Duration::from_millis(value.rate_window_ms),
            rate_max_requests: value.rate_max_requests.max(1),
            request_timeout: Duration::from_secs(value.request_timeout_secs.max(1)),
            state_dir: value.state_dir,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
