//! Reconnection Policy
//!
//! Computes the pause between connection attempts and decides when to give
//! up. The pause is `handshake_timeout + margin + uniform(jitter_min,
//! jitter_max)`, optionally grown by `multiplier` per consecutive failure and
//! capped at `max_delay`. With the default multiplier of 1.0 the delay stays
//! flat across attempts; the jitter spreads reconnect storms when the server
//! drops many clients at once.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Fixed margin added to the handshake timeout.
    pub margin: Duration,
    /// Lower bound of the uniform jitter.
    pub jitter_min: Duration,
    /// Upper bound of the uniform jitter.
    pub jitter_max: Duration,
    /// Growth per consecutive failed attempt (1.0 = none).
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            margin: Duration::from_millis(500),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(5),
            multiplier: 1.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            margin: settings.reconnect_margin,
            jitter_min: settings.reconnect_jitter_min,
            jitter_max: settings.reconnect_jitter_max,
            multiplier: settings.reconnect_multiplier,
            max_delay: settings.reconnect_delay_max,
        }
    }

    /// Configuration without jitter or margin, for deterministic delays.
    #[must_use]
    pub const fn fixed() -> Self {
        Self {
            margin: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::from_secs(300),
        }
    }
}

/// Reconnection policy for one `connect()` call.
///
/// # Example
///
/// ```rust
/// use market_event_stream::infrastructure::stream::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(), Duration::from_secs(2), 3);
///
/// policy.begin_attempt();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    handshake_timeout: Duration,
    max_attempts: u32,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy. `max_attempts == 0` never gives up.
    #[must_use]
    pub const fn new(config: ReconnectConfig, handshake_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            config,
            handshake_timeout,
            max_attempts,
            attempt_count: 0,
        }
    }

    /// Count a new attempt and return its 1-based number.
    pub const fn begin_attempt(&mut self) -> u32 {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.attempt_count
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let base = self
            .handshake_timeout
            .saturating_add(self.config.margin)
            .saturating_add(self.jitter());
        let exponent = i32::try_from(self.attempt_count.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);

        let scaled = Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(self.config.max_delay);

        Some(scaled.min(self.config.max_delay))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.max_attempts == 0 || self.attempt_count < self.max_attempts
    }

    fn jitter(&self) -> Duration {
        let min = self.config.jitter_min;
        let max = self.config.jitter_max.max(min);
        if max == min {
            return min;
        }

        let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.margin, Duration::from_millis(500));
        assert_eq!(config.jitter_min, Duration::from_secs(1));
        assert_eq!(config.jitter_max, Duration::from_secs(5));
        assert!((config.multiplier - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn flat_delay_by_default() {
        let config = ReconnectConfig {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            ..ReconnectConfig::default()
        };
        let mut policy = ReconnectPolicy::new(config, Duration::from_secs(2), 0);

        for _ in 0..5 {
            policy.begin_attempt();
            assert_eq!(policy.next_delay(), Some(Duration::from_millis(2500)));
        }
    }

    #[test]
    fn multiplier_grows_and_caps() {
        let config = ReconnectConfig {
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            ..ReconnectConfig::fixed()
        };
        let mut policy = ReconnectPolicy::new(config, Duration::from_secs(1), 0);

        policy.begin_attempt();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
        policy.begin_attempt();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        policy.begin_attempt();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
        policy.begin_attempt();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy =
            ReconnectPolicy::new(ReconnectConfig::fixed(), Duration::from_millis(100), 3);

        assert_eq!(policy.begin_attempt(), 1);
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.begin_attempt(), 2);
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.begin_attempt(), 3);

        // Third failure exhausts the budget
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn policy_reset() {
        let mut policy =
            ReconnectPolicy::new(ReconnectConfig::fixed(), Duration::from_millis(100), 2);

        policy.begin_attempt();
        policy.begin_attempt();
        assert!(!policy.should_retry());

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(
                ReconnectConfig::default(),
                Duration::from_secs(2),
                0,
            );
            policy.begin_attempt();

            let millis = policy.next_delay().unwrap().as_millis();

            // 2s handshake + 0.5s margin + [1s, 5s] jitter
            assert!(millis >= 3500, "delay {millis}ms is below minimum 3500ms");
            assert!(millis <= 7500, "delay {millis}ms is above maximum 7500ms");
        }
    }

    #[test]
    fn huge_handshake_timeout_is_capped() {
        let mut policy = ReconnectPolicy::new(
            ReconnectConfig::default(),
            Duration::from_secs(u64::MAX),
            0,
        );
        policy.begin_attempt();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn huge_multiplier_is_capped() {
        let config = ReconnectConfig {
            multiplier: f64::MAX,
            ..ReconnectConfig::default()
        };
        let mut policy = ReconnectPolicy::new(config, Duration::from_secs(10), 0);
        policy.begin_attempt();
        policy.begin_attempt();
        policy.begin_attempt();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(), Duration::ZERO, 0);

        for _ in 0..1000 {
            policy.begin_attempt();
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
        }
    }
}
