//! Retry logic with exponential backoff and rate-limit waits.
//!
//! Every resolver call goes through [`retry_async`]. Two schedules apply:
//! - Rate-limited responses sleep until the advertised reset (plus one
//!   second), bounded by [`RetryConfig::max_rate_limit_wait`].
//! - Other retryable failures back off exponentially: `2^attempt + 1` seconds
//!   between attempts, up to `max_attempts` total.
//!
//! The wrapper is transparent: callers cannot tell a retried call from a
//! first-try success except by latency.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::error::{GitScoutError, Result};
use crate::network::client::unix_now;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Base for the exponential schedule.
    pub base_delay: Duration,
    /// Constant added on top of the exponential term.
    pub delay_offset: Duration,
    /// Longest rate-limit reset worth sleeping through; beyond this the
    /// rate-limit error propagates.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: NetworkConfig::MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            delay_offset: Duration::from_secs(1),
            max_rate_limit_wait: NetworkConfig::RATE_LIMIT_MAX_WAIT,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    /// Backoff delay for a given attempt number (0-indexed): `2^attempt`
    /// times the base, plus the constant offset.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        Duration::from_secs_f64(exponential) + self.delay_offset
    }

    /// Wait until a rate limit resets: `max(reset - now, 0) + 1` seconds.
    /// Without an advertised reset, wait the constant offset.
    pub fn rate_limit_delay(&self, reset_epoch: Option<u64>) -> Duration {
        match reset_epoch {
            Some(reset) => Duration::from_secs(reset.saturating_sub(unix_now()) + 1),
            None => self.delay_offset,
        }
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total delay accumulated.
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// Last error message if failed.
    pub last_error: Option<String>,
}

/// Retry an async operation with exponential backoff and rate-limit waits.
///
/// `should_retry` decides whether a non-rate-limit error is worth another
/// attempt; rate limits are always handled by the reset-wait schedule.
///
/// Returns the final result together with [`RetryStats`].
pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&GitScoutError) -> bool,
) -> (Result<T>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut stats = RetryStats::default();

    for attempt in 0..config.max_attempts {
        stats.attempts = attempt + 1;

        match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => {
                stats.last_error = Some(e.to_string());

                let out_of_attempts = attempt + 1 >= config.max_attempts;

                // Rate limits get the reset-wait schedule instead of the
                // exponential one.
                if let GitScoutError::RateLimited { reset_epoch, .. } = &e {
                    let wait = config.rate_limit_delay(*reset_epoch);
                    if wait > config.max_rate_limit_wait {
                        warn!(
                            "Rate limit reset {}s away exceeds the {}s bound, giving up",
                            wait.as_secs(),
                            config.max_rate_limit_wait.as_secs()
                        );
                        return (Err(e), stats);
                    }
                    if out_of_attempts {
                        return (Err(e), stats);
                    }
                    warn!("Rate limit exceeded, waiting {:?} before retrying", wait);
                    stats.total_delay += wait;
                    tokio::time::sleep(wait).await;
                    continue;
                }

                if !should_retry(&e) {
                    debug!("Error is not retryable: {}", e);
                    return (Err(e), stats);
                }

                if out_of_attempts {
                    warn!(
                        "All {} retry attempts exhausted. Last error: {}",
                        config.max_attempts, e
                    );
                    return (Err(e), stats);
                }

                let delay = config.calculate_delay(attempt);
                stats.total_delay += delay;
                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("Retry loop should have returned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            delay_offset: Duration::from_millis(5),
            max_rate_limit_wait: Duration::from_secs(300),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let config = RetryConfig::default();
        // 2^0 + 1 = 2s, 2^1 + 1 = 3s, 2^2 + 1 = 5s
        assert_eq!(config.calculate_delay(0), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(3));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(5));
    }

    #[test]
    fn test_rate_limit_delay_from_reset() {
        let config = RetryConfig::default();

        // Reset two seconds in the future waits ~3s (delta + 1).
        let delay = config.rate_limit_delay(Some(unix_now() + 2));
        assert!(delay >= Duration::from_secs(2) && delay <= Duration::from_secs(4));

        // A reset in the past clamps to the +1 second.
        assert_eq!(config.rate_limit_delay(Some(0)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let (result, stats) = retry_async(&fast_config(), || async { Ok(42) }, |_| true).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 1);
        assert!(stats.success);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let (result, stats) = retry_async(
            &fast_config(),
            || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(GitScoutError::Network {
                            message: "flaky".into(),
                            cause: None,
                        })
                    } else {
                        Ok(7)
                    }
                }
            },
            GitScoutError::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.attempts, 3);
        assert!(stats.success);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let (result, stats) = retry_async(
            &fast_config(),
            || async {
                Err::<i32, _>(GitScoutError::Network {
                    message: "always fails".into(),
                    cause: None,
                })
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 3);
        assert!(!stats.success);
        assert_eq!(stats.last_error, Some("Network error: always fails".into()));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let (result, stats) = retry_async(
            &fast_config(),
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(GitScoutError::NotFound {
                        what: "o/r".into(),
                    })
                }
            },
            GitScoutError::is_retryable,
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(stats.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_until_reset_then_retries_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let reset = unix_now() + 2;

        let (result, stats) = retry_async(
            &RetryConfig::default(),
            || {
                let counter = counter_clone.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(GitScoutError::RateLimited {
                            service: "api.github.com".into(),
                            reset_epoch: Some(reset),
                        })
                    } else {
                        Ok("payload")
                    }
                }
            },
            GitScoutError::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), "payload");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(stats.attempts, 2);
        // The sleep covered the advertised reset window plus the one-second
        // safety margin.
        assert!(stats.total_delay >= Duration::from_secs(2));
        assert!(stats.total_delay <= Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_rate_limit_beyond_bound_propagates() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let (result, stats) = retry_async(
            &RetryConfig::default(),
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(GitScoutError::RateLimited {
                        service: "api.github.com".into(),
                        reset_epoch: Some(unix_now() + 3600),
                    })
                }
            },
            GitScoutError::is_retryable,
        )
        .await;

        assert!(matches!(
            result.unwrap_err(),
            GitScoutError::RateLimited { .. }
        ));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(stats.attempts, 1);
    }
}
