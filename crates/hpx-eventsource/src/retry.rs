//! Bounded reconnection policy.
//!
//! The policy is a pure decision function: it never sleeps or schedules
//! anything itself. The connection state machine asks it what to do after a
//! failure and arms the corresponding timer.

use std::time::Duration;

/// Retry interval, retry cap and establishment timeout for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before each automatic reconnection attempt.
    pub retry_interval: Duration,
    /// Maximum number of automatic reconnection attempts.
    pub max_retries: u32,
    /// Maximum time allowed for a connection attempt to open.
    pub timeout: Duration,
}

/// Outcome of a retry decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect after `delay`; `attempt` is the new retry counter (1-based).
    Retry {
        /// Retry counter after this attempt is scheduled.
        attempt: u32,
        /// Delay before the reconnection attempt.
        delay: Duration,
    },
    /// The retry budget is exhausted.
    GiveUp,
}

impl RetryPolicy {
    /// Create a new policy.
    pub const fn new(retry_interval: Duration, max_retries: u32, timeout: Duration) -> Self {
        Self {
            retry_interval,
            max_retries,
            timeout,
        }
    }

    /// Whether another automatic reconnection is allowed at `retry_count`.
    pub const fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before the next reconnection attempt.
    ///
    /// The interval is constant: no backoff, no jitter.
    pub const fn delay(&self) -> Duration {
        self.retry_interval
    }

    /// Decide what to do after a failure observed at `retry_count`.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if self.should_retry(retry_count) {
            RetryDecision::Retry {
                attempt: retry_count.saturating_add(1),
                delay: self.delay(),
            }
        } else {
            RetryDecision::GiveUp
        }
    }
}
