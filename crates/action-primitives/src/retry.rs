//! Explicit retry policy for action execution.
//!
//! Retry behavior is data, not a nest of handlers: attempt count, backoff,
//! and the fallback trigger live here so each decision point is testable
//! on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Finite-state retry policy applied to every executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total resolution attempts, first try included.
    pub max_attempts: u32,
    /// Pause between attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Whether click actions fall back to a forced low-level click once
    /// the attempt budget is exhausted.
    pub fallback_on_exhaust: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            fallback_on_exhaust: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_ms: backoff.as_millis() as u64,
            fallback_on_exhaust: true,
        }
    }

    /// Policy for tests: single attempt, no backoff, no fallback.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
            fallback_on_exhaust: false,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Whether another attempt is allowed after `attempts_made` tries.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
