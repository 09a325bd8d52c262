//! Retry with exponential backoff for errors that classify themselves.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use watcher_chain::ChainError;

use crate::error::ValuationError;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ValuationError {
    fn is_retryable(&self) -> bool {
        ValuationError::is_retryable(self)
    }
}

impl Retryable for ChainError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// attempts are used up. The last error is returned.
///
/// Once `shutdown` is cancelled no further attempt starts and a pending
/// backoff ends early; the error in hand is returned.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    operation: &str,
    mut f: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                if attempt >= policy.max_attempts {
                    warn!(operation, attempts = attempt, error = %err, "Giving up after retries");
                    return Err(err);
                }
                if shutdown.is_cancelled() {
                    debug!(operation, attempt, "Shutdown requested, not retrying");
                    return Err(err);
                }

                debug!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => {
                        debug!(operation, attempt, "Shutdown requested during backoff");
                        return Err(err);
                    }
                }
                delay = delay.mul_f64(policy.backoff_factor).min(policy.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
        }
    }

    fn outage() -> ValuationError {
        ValuationError::ChainUnavailable {
            pair: Address::ZERO,
            source: ChainError::Transport("timeout".into()),
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(3), &CancellationToken::new(), "value", || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(outage())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(3), &CancellationToken::new(), "value", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(outage()) }
        })
        .await;

        assert!(matches!(result, Err(ValuationError::ChainUnavailable { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(3), &CancellationToken::new(), "value", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(ValuationError::EmptyPool(Address::ZERO)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_shutdown_stops_retries() {
        let shutdown = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let slow = RetryPolicy {
            initial_delay: Duration::from_secs(30),
            ..fast(3)
        };

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            with_retry(&slow, &shutdown, "value", || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                shutdown.cancel();
                async { Err::<i32, _>(outage()) }
            }),
        )
        .await
        .expect("retry loop kept running after shutdown");

        assert!(matches!(result, Err(ValuationError::ChainUnavailable { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let shutdown = CancellationToken::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let slow = RetryPolicy {
            initial_delay: Duration::from_secs(30),
            ..fast(3)
        };

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            with_retry(&slow, &shutdown, "value", || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(outage()) }
            }),
        )
        .await
        .expect("backoff was not interrupted");

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::with_attempts(0).max_attempts, 1);
    }
}
