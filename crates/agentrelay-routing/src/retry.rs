//! Bounded retry with exponential backoff

use agentrelay_core::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors that know whether trying again might help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempt: u32,
    next_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            next_delay: config.initial_backoff(),
            config,
            attempt: 0,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.attempt < self.config.max_retries
    }

    /// Retries taken so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next_delay;
        self.attempt += 1;
        let grown = (self.next_delay.as_millis() as f64 * self.config.multiplier).round() as u64;
        self.next_delay = Duration::from_millis(grown.min(self.config.max_backoff_ms));
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.next_delay = self.config.initial_backoff();
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of retries.
pub async fn retry_async<F, Fut, T, E>(operation: F, policy: &mut RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    retry_async_until(operation, policy, &CancellationToken::new()).await
}

/// [`retry_async`] that stops retrying once `cancel` fires. A backoff sleep
/// in progress is cut short and the last error is returned.
pub async fn retry_async_until<F, Fut, T, E>(
    mut operation: F,
    policy: &mut RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    loop {
        match operation().await {
            Ok(value) => {
                if policy.attempt() > 0 {
                    debug!("Succeeded after {} attempts", policy.attempt() + 1);
                }
                return Ok(value);
            }
            Err(error) => {
                if !error.is_retryable() {
                    debug!("Non-retryable error: {}", error);
                    return Err(error);
                }
                if !policy.should_retry() {
                    warn!("Giving up after {} retries: {}", policy.attempt(), error);
                    return Err(error);
                }
                let delay = policy.next_delay();
                warn!("Attempt {} failed: {}. Retrying in {:?}", policy.attempt(), error, delay);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Retry abandoned: cancelled");
                        return Err(error);
                    }
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}
