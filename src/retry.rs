//! Bounded retry with exponential backoff around remote calls.

use crate::error::ServiceError;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Maximum number of attempts for a single remote call.
pub const MAX_RETRIES: u32 = 3;
/// Multiplier applied to the delay between attempts.
pub const BACKOFF: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            backoff: BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: u64) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Delay after the given failed attempt (1-indexed): `backoff^attempt` seconds.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff.saturating_pow(attempt))
    }

    /// Runs `operation` until it succeeds or the attempts are exhausted.
    ///
    /// Returns `None` once every attempt failed; each failure is logged with
    /// its attempt number and the remote error. No delay follows the final
    /// attempt.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => return Some(value),
                Err(e) => {
                    error!("Attempt {} out of {} failed", attempt, self.max_attempts);
                    error!("{}", e);
                }
            }
            if attempt < self.max_attempts {
                let delay = self.delay(attempt);
                info!("Waiting {} seconds before next retry", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
        }
        error!("Reached a maximum number of {} retries.", self.max_attempts);
        None
    }
}
