//! Exponential backoff for transient store failures

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Final error of [`RetryPolicy::run`] with the number of attempts made
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub error: E,
    pub exhausted: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the `retry`-th retry (1-based): `base * 2^(retry - 1)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(2_u32.pow(exponent))
    }

    /// Run `operation` until it succeeds, fails with a non-transient error,
    /// or the attempt budget is spent.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, is_transient: P) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if !is_transient(&error) => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                        exhausted: false,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(RetryFailure {
                        attempts: attempt,
                        error,
                        exhausted: true,
                    });
                }
                Err(error) => {
                    let backoff = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient failure, retrying: {}",
                        error
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
