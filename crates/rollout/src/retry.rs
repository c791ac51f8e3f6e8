//! Retry with exponential backoff for opening device sessions.
//!
//! Only the orchestrator retries; the connection manager never does.

use crate::error::{Error, Result};
use std::thread;
use std::time::Duration;

/// Retry configuration for session opening.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 means no retry)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Retry up to `retries` extra times with the default backoff.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Default::default()
        }
    }

    /// A config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retrying after the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `operation`, retrying retryable errors.
///
/// `on_retry` receives the 1-indexed attempt that failed, the error, and the
/// delay before the next attempt.
pub fn with_retry<T, F, R>(config: &RetryConfig, mut on_retry: R, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
    R: FnMut(u32, &Error, Duration),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt + 1 >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                on_retry(attempt + 1, &e, delay);
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
