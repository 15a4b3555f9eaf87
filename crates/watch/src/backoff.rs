//! Exponential backoff between re-subscriptions.
//!
//! A subscription never reconnects on its own. When its stream drops before
//! the job finishes, the watcher waits [`next_delay`]-spaced intervals and
//! opens a fresh subscription for the same job id, up to
//! [`BackoffConfig::max_attempts`] times.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first re-subscription.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Re-subscriptions allowed before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Tracks attempts and the delay before the next one.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            delay: config.initial_delay,
            attempt: 0,
            config,
        }
    }

    /// Delay to wait before the next attempt, or `None` once attempts are
    /// exhausted.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;
        let delay = self.delay;
        self.delay = next_delay(self.delay, &self.config);
        Some(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Start over after the stream delivered progress again.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.delay = self.config.initial_delay;
    }
}
