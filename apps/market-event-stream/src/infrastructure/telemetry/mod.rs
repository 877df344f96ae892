//! Tracing Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`. The
//! library itself only emits `tracing` events; applications that already
//! install a subscriber can skip this module.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives (default adds `market_event_stream=info`)
//! - `MARKET_STREAM_LOG_TARGETS`: Set to "false" to hide event targets
//!
//! # Usage
//!
//! ```ignore
//! use market_event_stream::infrastructure::telemetry;
//!
//! // Initialize at startup (returns guard that should be kept alive)
//! let _guard = telemetry::init();
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive added on top of `RUST_LOG`.
const DEFAULT_DIRECTIVE: &str = "market_event_stream=info";

/// Returned by [`init`]; logs shutdown when dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    installed: bool,
}

impl TelemetryGuard {
    /// Whether this call installed the global subscriber. `false` when one
    /// was already set.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.installed {
            tracing::debug!("Telemetry shutting down");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Directive applied in addition to `RUST_LOG`.
    pub default_directive: String,
    /// Include event targets in output.
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_directive: DEFAULT_DIRECTIVE.to_string(),
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let with_target = std::env::var("MARKET_STREAM_LOG_TARGETS")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            with_target,
            ..Self::default()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let filter = EnvFilter::from_default_env();
        match self.default_directive.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(e) => {
                eprintln!("Ignoring invalid log directive {:?}: {e}", self.default_directive);
                filter
            }
        }
    }
}

/// Initialize telemetry with default configuration from environment.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize telemetry with custom configuration.
#[must_use]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .is_ok();

    TelemetryGuard { installed }
}

// =============================================================================
// Tests
// =============================================================================
