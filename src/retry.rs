//! Bounded retry with linear backoff, shared by network collaborators.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::{COMP_FETCH_BACKOFF_STEP_MS, COMP_FETCH_MAX_ATTEMPTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Sleep `attempt * backoff_step` after failed attempt number `attempt` (1-based).
    pub backoff_step: Duration,
}

/// Why `RetryPolicy::run` gave up.
#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
    /// A non-retryable error stopped the loop early.
    Permanent { attempt: u32, error: E },
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step,
        }
    }

    /// 3 attempts, 0.8s linear step.
    pub fn comp_fetch() -> Self {
        Self::new(
            COMP_FETCH_MAX_ATTEMPTS,
            Duration::from_millis(COMP_FETCH_BACKOFF_STEP_MS),
        )
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// The backoff sleep blocks the calling task. No sleep follows the last attempt.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Permanent { attempt, error });
                }
                Err(error) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                Err(error) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying: {error}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::comp_fetch()
    }
}
