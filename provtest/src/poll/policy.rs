//! Poll interval and timeout configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Interval between probe attempts and the overall budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay between probe attempts in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Overall timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    3_000
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy from durations.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: duration_ms(interval),
            timeout_ms: duration_ms(timeout),
        }
    }

    /// Policy for connection and consistency checks (3s / 60s).
    #[must_use]
    pub fn connection() -> Self {
        Self::default()
    }

    /// Policy for full end-to-end readiness checks (3s / 10min).
    #[must_use]
    pub fn end_to_end() -> Self {
        Self::default().with_timeout(Duration::from_secs(600))
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = duration_ms(interval);
        self
    }

    /// Sets the overall timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// Returns the poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the overall timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns true if the interval does not fit inside the timeout.
    ///
    /// Such a policy allows a single probe attempt.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.interval_ms == 0 || self.interval_ms >= self.timeout_ms
    }

    /// Returns the most probe attempts the policy allows.
    ///
    /// A tick landing exactly on the deadline does not count.
    #[must_use]
    pub fn max_attempts(&self) -> u64 {
        if self.is_degenerate() {
            1
        } else {
            (self.timeout_ms - 1) / self.interval_ms
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
