//! Reconnect backoff for native push subscriptions
//!
//! The delay for attempt `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`. After `max_retries` consecutive failures the monitor stops trying to
//! re-open the subscription and polls instead.

use std::time::Duration;

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub first: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Multiplicative growth factor
    pub factor: f64,
    /// Consecutive failures tolerated before degrading to polling
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before retry number `attempt`
    pub fn next(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exponent);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Whether `failures` consecutive failures exhaust the retry budget
    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_retries
    }
}
