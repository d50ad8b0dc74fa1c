use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreResult;

/// Retry policy for idempotent reads.
///
/// Only errors classified as transient are retried; the write path never
/// goes through a retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubled after each failure.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 10,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
        }
    }

    pub fn run<T>(&self, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let mut delay = Duration::from_millis(self.backoff_ms);
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.attempts.max(1) => {
                    debug!(attempt, error = %e, "transient read failure; retrying");
                    thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
