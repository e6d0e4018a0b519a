//! Retry with exponential backoff for transient platform errors.
//!
//! Backoff is 2^n seconds capped at five minutes. Only transient
//! (rate-limit/network) errors retry; permission and logic errors fail
//! immediately so remediation handlers can log and move on.

use super::traits::PlatformError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum retry attempts before giving up.
const MAX_RETRIES: u32 = 5;

/// Backoff cap. Remediation must stay near-real-time, so the cap is much
/// tighter than a generic client would use.
const MAX_BACKOFF_SECS: u64 = 300;

/// Retry a platform operation with exponential backoff.
///
/// Returns the operation's result, or the last error once retries are
/// exhausted or a non-retryable error occurs.
pub async fn retry_transient<F, Fut, T>(mut operation: F) -> Result<T, PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !err.is_retryable() || attempt >= MAX_RETRIES {
                    return Err(err);
                }

                let backoff_secs = 2u64.pow(attempt).min(MAX_BACKOFF_SECS);
                warn!(
                    target: "warden::system",
                    attempt = attempt + 1,
                    backoff_secs,
                    error = %err,
                    "transient platform error, retrying"
                );

                sleep(Duration::from_secs(backoff_secs)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_succeeds_immediately() {
        let result = retry_transient(|| async { Ok::<_, PlatformError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_transient(move || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PlatformError::Transient("rate limited".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<(), _> = retry_transient(move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(PlatformError::PermissionDenied("no capability".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_stays_under_cap() {
        assert!(2u64.pow(MAX_RETRIES) < MAX_BACKOFF_SECS * 2);
        assert_eq!(2u64.pow(10).min(MAX_BACKOFF_SECS), MAX_BACKOFF_SECS);
    }
}
