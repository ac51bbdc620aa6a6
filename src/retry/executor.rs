//! Executes an async operation under a [`RetryPolicy`].

use super::RetryPolicy;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors that know whether retrying them can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("operation cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The underlying operation error, if there was one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Permanent(e) => Some(e),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// runs out of attempts, or `cancel` fires.
///
/// Cancellation is checked before every attempt and raced against every
/// backoff sleep. The closure receives the 0-indexed attempt number.
pub async fn execute<T, E, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            debug!("{}: non-retryable error on attempt {}: {}", name, attempt + 1, err);
            return Err(RetryError::Permanent(err));
        }

        attempt += 1;
        if attempt >= max_attempts {
            warn!("{}: giving up after {} attempts: {}", name, attempt, err);
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let delay = policy.backoff_with_jitter(attempt - 1);
        warn!(
            "{}: attempt {}/{} failed: {}, retrying in {}ms",
            name,
            attempt,
            max_attempts,
            err,
            delay.as_millis()
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
    }
}
