//! Bounded retry with a fixed delay.
//!
//! OpenStack services come up slowly during a deployment, so node creation
//! keeps retrying while the provisioning service refuses connections, and node
//! updates retry briefly while the conductor holds a lock on the node. The
//! policies live here as named constants so callers (and tests) can swap them.

use std::time::Duration;

use tracing::{debug, warn};

/// Attempt ceiling and delay for an operation that may fail transiently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

/// Node creation: 60 tries, 10 seconds apart (about ten minutes).
pub const REGISTER_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 60,
    delay: Duration::from_secs(10),
};

/// Node update while the node is locked: 2 tries, 5 seconds apart.
pub const UPDATE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 2,
    delay: Duration::from_secs(5),
};

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Same attempt ceiling, no sleeping between attempts
    pub const fn without_delay(self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            delay: Duration::ZERO,
        }
    }

    /// Policy that polls for `timeout` in steps of `interval`
    pub fn polling(timeout: Duration, interval: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            (timeout.as_secs_f64() / interval.as_secs_f64()).floor() as u32
        };
        Self {
            max_attempts: attempts.max(1),
            delay: interval,
        }
    }
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or `policy.max_attempts` attempts have been made.
///
/// The last error is returned when the ceiling is reached; callers decide how
/// to report exhaustion.
pub async fn retry<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(operation = %operation_name, attempt, "Attempting operation");

        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) if should_retry(&e) && attempt < policy.max_attempts => {
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}
