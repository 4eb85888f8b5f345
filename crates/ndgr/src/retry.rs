//! Fixed-interval retry for segment fetches.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{FetchError, NdgrError, Result};

/// How often and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retry: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry: u32, interval: Duration) -> Self {
        Self {
            max_retry,
            interval,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    Success(T),
    /// Connection-level fault; worth another attempt.
    Retry(FetchError),
    /// Deliberate answer from the origin or a local fault; give up.
    Fail(FetchError),
}

impl<T> RetryAction<T> {
    /// Classify a fetch result by [`FetchFailure::is_transient`](crate::FetchFailure::is_transient).
    pub fn classify(result: std::result::Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) if err.failure.is_transient() => Self::Retry(err),
            Err(err) => Self::Fail(err),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or retries run out.
///
/// Cancellation is checked before every attempt and interrupts the wait
/// between attempts; it surfaces as [`NdgrError::Disposed`].
pub async fn retry_fixed<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(NdgrError::Disposed);
        }

        let err = match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err.into()),
            RetryAction::Retry(err) => err,
        };

        if attempt >= policy.max_retry {
            return Err(err.into());
        }
        attempt += 1;

        warn!(
            attempt,
            max = policy.max_retry,
            delay_ms = policy.interval.as_millis() as u64,
            phase = %err.phase,
            uri = %err.uri,
            error = %err.failure,
            "Retrying fetch after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(NdgrError::Disposed),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}
