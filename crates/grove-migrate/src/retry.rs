//! Rate-limit retry for calls to the import endpoint.
//!
//! Only HTTP 429 is retried. Transport errors and every other status are
//! handed back to the caller on the first occurrence.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{MigrationError, Result};

/// HTTP status that triggers a retry.
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Something that can wait. Injected so tests do not sleep for real.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and remembers every requested delay.
#[derive(Debug, Default)]
pub struct InstantSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// A response that carries an HTTP status code.
pub trait StatusCode {
    fn status_code(&self) -> u16;
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included.
    pub max_retries: u32,
    /// Delay after the first 429.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each 429.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(10),
            multiplier: 2,
        }
    }
}

/// Attempt counter and next delay for one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetryState {
    attempt: u32,
    delay: Duration,
}

impl RetryState {
    fn advance(&mut self, multiplier: u32) {
        self.attempt += 1;
        self.delay = self.delay.saturating_mul(multiplier);
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_retries: u32, initial_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier,
        }
    }

    /// Run `operation` until it yields something other than a 429.
    ///
    /// `operation` is called once per attempt and must build a fresh request
    /// each time.
    pub async fn execute<S, F, Fut, R>(&self, sleeper: &S, mut operation: F) -> Result<R>
    where
        S: Sleeper + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
        R: StatusCode,
    {
        let mut state = RetryState {
            attempt: 1,
            delay: self.initial_delay,
        };

        while state.attempt <= self.max_retries {
            let response = operation().await.map_err(|e| {
                tracing::warn!(attempt = state.attempt, error = %e, "Import request failed");
                e
            })?;

            if response.status_code() != TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if state.attempt == self.max_retries {
                break;
            }

            tracing::warn!(
                attempt = state.attempt,
                delay_secs = state.delay.as_secs_f64(),
                "Rate limited on import (429), waiting before retry"
            );
            sleeper.sleep(state.delay).await;
            state.advance(self.multiplier);
        }

        Err(MigrationError::RateLimitExhausted {
            attempts: self.max_retries,
        })
    }
}
