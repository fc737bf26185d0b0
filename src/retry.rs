//! Bounded retry policy shared by every retry site
//!
//! Registry creation/extension, sends through the legacy executor and the
//! sweep's sell loop all go through [`retry_with_backoff`] instead of
//! hand-written counter loops.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::LaunchError;

/// Which failures are worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Only errors whose `is_retryable()` is true
    Transient,
    /// Every error until the ceiling is hit
    Any,
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    pub base_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
    /// Jitter factor (0.0 to 1.0) - adds randomness to backoff
    pub jitter_factor: f64,
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 5000,
            jitter_factor: 0.2,
            retry_on: RetryOn::Transient,
        }
    }
}

impl RetryConfig {
    /// Constant delay between attempts, retrying on any error
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            base_backoff_ms: ms,
            max_backoff_ms: ms,
            jitter_factor: 0.0,
            retry_on: RetryOn::Any,
        }
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Calculate backoff delay for a given attempt (0-indexed)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * 2^attempt
        let exp_backoff = (self.base_backoff_ms as f64) * 2_f64.powi(attempt as i32);
        let capped_backoff = exp_backoff.min(self.max_backoff_ms as f64);

        let jitter_range = capped_backoff * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_backoff = (capped_backoff + jitter).max(0.0);

        Duration::from_millis(final_backoff as u64)
    }

    fn should_retry(&self, err: &LaunchError) -> bool {
        match self.retry_on {
            RetryOn::Any => true,
            RetryOn::Transient => err.is_retryable(),
        }
    }
}

/// Terminal outcome of a retried operation
#[derive(Debug)]
pub struct RetryExhausted {
    pub operation: String,
    /// Attempts actually made
    pub attempts: u32,
    pub last_error: LaunchError,
}

impl std::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.operation, self.attempts, self.last_error
        )
    }
}

impl std::error::Error for RetryExhausted {}

/// Run `operation` until it succeeds or the policy gives up
///
/// The attempt counter lives inside this call, so each invocation starts
/// from zero. A non-retryable error under [`RetryOn::Transient`] ends the
/// loop immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LaunchError>>,
{
    let start_time = std::time::Instant::now();
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts,
                "Retrying operation"
            );
        }

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                attempt += 1;

                if !config.should_retry(&err) {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "Permanent error, not retrying"
                    );
                    return Err(RetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last_error: err,
                    });
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %err,
                        "All retry attempts exhausted"
                    );
                    return Err(RetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        last_error: err,
                    });
                }

                let backoff = config.calculate_backoff(attempt - 1);
                debug!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Attempt failed, backing off before retry"
                );
                sleep(backoff).await;
            }
        }
    }
}
