// Free-function retry decorator (spec §9: "model retries as a single
// higher-order function taking a closure and a policy value").
//
// Adapters wrap their single-attempt call with `retry(...)`; the refresh
// engine never sees a retry loop, only the final exhausted failure.

use std::future::Future;
use std::time::Duration;

/// Default base delay before the first retry. Doubled per attempt
/// (`2^attempt * base_delay`) up to `policy.max_retries`.
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Default ceiling on retry attempts for a single logical call.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_RETRY_DELAY,
        }
    }
}

/// An error that knows whether retrying the same call could plausibly help.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

/// Runs `op`, retrying on a retryable error up to `policy.max_retries` times
/// with exponential backoff. Returns the last error once attempts are
/// exhausted, or immediately on a non-retryable error.
pub async fn retry<F, Fut, T, E>(mut op: F, policy: &RetryPolicy) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && err.is_retryable() => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!(
                        "retrying after attempt {} failed, sleeping {:?}",
                        attempt + 1,
                        delay
                    );
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);
    impl RetryableError for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, Flaky> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            },
            &policy,
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, Flaky> = retry(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Flaky(true))
                } else {
                    Ok(42)
                }
            },
            &policy,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, Flaky> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(false))
            },
            &policy,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<u32, Flaky> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky(true))
            },
            &policy,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
