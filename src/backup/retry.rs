//! Retry with exponential backoff for fallible network calls
//!
//! Only errors that report themselves as [`Retryable`] are retried; anything
//! else is returned after the first attempt. With `max_attempts = 3` and a
//! 3s initial delay the schedule is: attempt, sleep 3s, attempt, sleep 6s,
//! attempt, then the last error is returned.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::metrics;

/// Errors that know whether repeating the operation may help
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Attempt budget and backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            config.backoff_multiplier,
        )
    }

    /// Retry once with no delay; handy in tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The sleeps taken between attempts when every attempt fails
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut delay = self.initial_delay;
        (1..self.max_attempts).map(move |_| {
            let current = delay;
            delay = delay.mul_f64(self.backoff_multiplier);
            current
        })
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent
///
/// Makes at most `max_attempts` calls and sleeps between consecutive
/// failures only, so an exhausted budget costs `max_attempts - 1` sleeps.
/// The last error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut delays = policy.delays();
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => match delays.next() {
                Some(delay) => {
                    tracing::warn!(
                        operation = operation,
                        error = %e,
                        attempt = attempt,
                        remaining = policy.max_attempts - attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed, retrying in {:.1}s",
                        operation,
                        delay.as_secs_f64()
                    );
                    metrics::record_retry(operation);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    tracing::error!(
                        operation = operation,
                        error = %e,
                        attempts = attempt,
                        "{} failed, giving up",
                        operation
                    );
                    return Err(e);
                }
            },
            Err(e) => return Err(e),
        }
    }
}
