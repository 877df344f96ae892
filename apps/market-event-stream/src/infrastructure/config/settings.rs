//! Client Configuration Settings
//!
//! Configuration types for the event-stream client, loaded from environment
//! variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Event service API credentials.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Stream connection and delivery settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Bound on each connection attempt.
    pub handshake_timeout: Duration,
    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_retries: u32,
    /// Fixed margin added to every reconnect delay.
    pub reconnect_margin: Duration,
    /// Lower bound of the reconnect jitter.
    pub reconnect_jitter_min: Duration,
    /// Upper bound of the reconnect jitter.
    pub reconnect_jitter_max: Duration,
    /// Reconnect delay growth per failed attempt (1.0 = flat).
    pub reconnect_multiplier: f64,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Delivery queue capacity.
    pub queue_capacity: usize,
    /// Minimum spacing between opportunistic checkpoint writes.
    pub checkpoint_interval: Duration,
    /// Spacing between repeated `Disconnected` records.
    pub disconnected_pause: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            max_retries: 5,
            reconnect_margin: Duration::from_millis(500),
            reconnect_jitter_min: Duration::from_secs(1),
            reconnect_jitter_max: Duration::from_secs(5),
            reconnect_multiplier: 1.0,
            reconnect_delay_max: Duration::from_secs(300),
            queue_capacity: 10_000,
            checkpoint_interval: Duration::from_secs(10),
            disconnected_pause: Duration::from_secs(2),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stream base URL (`ws://` or `wss://`).
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Checkpoint file; no checkpointing when unset.
    pub checkpoint_path: Option<PathBuf>,
    /// Connection and delivery settings.
    pub stream: StreamSettings,
}

impl ClientConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            checkpoint_path: None,
            stream: StreamSettings::default(),
        }
    }

    /// Use a checkpoint file.
    #[must_use]
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Create configuration from environment variables, after loading the
    /// nearest `.env` file if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or the
    /// URL is not a WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = required(&lookup, "MARKET_STREAM_URL")?;
        let api_key = required(&lookup, "MARKET_STREAM_API_KEY")?;

        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "MARKET_STREAM_URL".to_string(),
                reason: "expected a ws:// or wss:// URL".to_string(),
            });
        }

        let checkpoint_path = lookup("MARKET_STREAM_CHECKPOINT_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            handshake_timeout: parse_duration_secs(
                &lookup,
                "MARKET_STREAM_HANDSHAKE_TIMEOUT_SECS",
                defaults.handshake_timeout,
            ),
            max_retries: parse_or(&lookup, "MARKET_STREAM_MAX_RETRIES", defaults.max_retries),
            reconnect_margin: parse_duration_millis(
                &lookup,
                "MARKET_STREAM_RECONNECT_MARGIN_MS",
                defaults.reconnect_margin,
            ),
            reconnect_jitter_min: parse_duration_millis(
                &lookup,
                "MARKET_STREAM_RECONNECT_JITTER_MIN_MS",
                defaults.reconnect_jitter_min,
            ),
            reconnect_jitter_max: parse_duration_millis(
                &lookup,
                "MARKET_STREAM_RECONNECT_JITTER_MAX_MS",
                defaults.reconnect_jitter_max,
            ),
            reconnect_multiplier: parse_or(
                &lookup,
                "MARKET_STREAM_RECONNECT_MULTIPLIER",
                defaults.reconnect_multiplier,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "MARKET_STREAM_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            queue_capacity: parse_or(
                &lookup,
                "MARKET_STREAM_QUEUE_CAPACITY",
                defaults.queue_capacity,
            ),
            checkpoint_interval: parse_duration_secs(
                &lookup,
                "MARKET_STREAM_CHECKPOINT_INTERVAL_SECS",
                defaults.checkpoint_interval,
            ),
            disconnected_pause: parse_duration_millis(
                &lookup,
                "MARKET_STREAM_DISCONNECTED_PAUSE_MS",
                defaults.disconnected_pause,
            ),
        };

        Ok(Self {
            url,
            credentials: Credentials::new(api_key),
            checkpoint_path,
            stream,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable holds an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong.
        reason: String,
    },
}

/// Load `.env` from the current directory or the nearest ancestor that has
/// one. Variables already set are kept. Returns the file that was loaded.
pub fn load_dotenv() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    load_dotenv_from(&cwd)
}

/// Like [`load_dotenv`], searching upward from `start`.
pub fn load_dotenv_from(start: &Path) -> Option<PathBuf> {
    let path = start
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())?;

    match dotenvy::from_path(&path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Loaded .env");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load .env");
            None
        }
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
