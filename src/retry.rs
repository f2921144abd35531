//! Channel-level retry with a fixed delay
//!
//! The execution engine already rotates strategies and cools down per failure
//! class inside one attempt. This module adds the coarse outer loop: run a
//! whole channel pass up to `max_attempts` times with a fixed pause between
//! attempts, giving up early on errors that cannot improve with time.
//!
//! # Example
//!
//! ```no_run
//! use channel_tracker::retry::{RetryPolicy, retry_fixed};
//! use channel_tracker::Error;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy { max_attempts: 3, delay: Duration::from_secs(5) };
//! let cancel = CancellationToken::new();
//! let items = retry_fixed(&policy, &cancel, |attempt| async move {
//!     // list the channel here
//!     Ok::<_, Error>(attempt)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
///
/// Failures talking to the content source are transient. Missing or inactive
/// channels, configuration problems and shutdown are permanent.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Source-side failures can clear up between attempts
            Error::Fetch(_) | Error::Timeout(_) | Error::AttemptsExhausted { .. } => true,
            // I/O errors can be retryable in some cases
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            // Database errors should not be retried (likely permanent)
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::ChannelNotFound(_) | Error::ChannelInactive(_) => false,
            // A missing yt-dlp binary does not appear by waiting
            Error::ExternalTool(_) => false,
            Error::Duplicate(_) => false,
            Error::ShuttingDown => false,
            Error::Serialization(_) => false,
            // Unknown errors - be conservative and don't retry
            Error::Other(_) => false,
        }
    }
}

/// Attempts and pause for [`retry_fixed`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts
///
/// The closure receives the 1-based attempt number. Cancellation is checked
/// before each retry and during the pause; an attempt that is already running
/// is never interrupted.
///
/// # Returns
///
/// The first success, the first non-retryable error, [`Error::ShuttingDown`]
/// if cancelled between attempts, or the last error once attempts run out.
pub async fn retry_fixed<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = policy.delay.as_millis() as u64,
                    "attempt failed, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::ShuttingDown),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt, "all retry attempts exhausted");
                } else {
                    tracing::debug!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}
