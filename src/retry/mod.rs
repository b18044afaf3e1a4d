//! Bounded retries with exponential backoff.
//!
//! [`with_retry`] re-runs an async operation while its error is retryable
//! (see [`RetryPolicy::is_retryable`]) and the attempt budget lasts. A
//! non-retryable error fails on the first attempt without sleeping.

mod policy;

pub use policy::{RetryPolicy, RETRYABLE_STATUSES};

use crate::core::error::{DependencyError, StoreError};

use std::fmt;
use std::future::Future;
use thiserror::Error;

/// An error that can be classified for retry purposes.
pub trait RetryableError: fmt::Display {
    /// HTTP-like status carried by the error, if any.
    fn status_code(&self) -> Option<u16>;
}

impl RetryableError for DependencyError {
    fn status_code(&self) -> Option<u16> {
        DependencyError::status_code(self)
    }
}

impl RetryableError for StoreError {
    fn status_code(&self) -> Option<u16> {
        StoreError::status_code(self)
    }
}

/// Failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The error was not retryable.
    #[error("attempt {attempt} failed permanently: {source}")]
    Permanent {
        /// Attempt on which the error occurred.
        attempt: u32,
        /// The underlying error.
        source: E,
    },

    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error.
        source: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempt, .. } => *attempt,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Returns the last underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    /// Borrows the last underlying error.
    pub fn inner(&self) -> &E {
        match self {
            Self::Permanent { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}

/// Runs `operation` under `policy`, sleeping between retryable failures.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt: u32 = 0;
    loop {
        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(err) => {
                let message = err.to_string();
                if !policy.is_retryable(err.status_code(), &message) {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        error = %message,
                        "non-retryable failure"
                    );
                    return Err(RetryError::Permanent {
                        attempt,
                        source: err,
                    });
                }

                if !policy.should_retry(attempt) {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %message,
                        "retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        source: err,
                    });
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    next_delay_ms = policy.delay_for_attempt(attempt).as_millis() as u64,
                    error = %message,
                    "attempt failed, retrying"
                );
            }
        }
    }
}
