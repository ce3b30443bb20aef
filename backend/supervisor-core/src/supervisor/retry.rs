//! Bounded retry for controller calls that race a core still booting its API.
//!
//! IPC calls are not wrapped here: [`crate::ipc::IpcClient`] retries
//! connection failures itself.

use crate::error::CoreError;

use std::future::Future;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::debug;
use tokio::time::sleep as TokioSleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` until it succeeds, fails with an error that
    /// [`CoreError::is_retryable`] rejects, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_delay,
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    debug!("{name} attempt {attempt}/{} failed: {e}", self.max_attempts);
                    if let Some(delay) = backoff.next_backoff() {
                        TokioSleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
