//! Pacing and retries for Gemini requests
//!
//! Every batch running in the process draws from one request bucket, so the
//! configured rate is a ceiling for the whole server rather than per batch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use crate::config::RateLimitConfig;

/// Token bucket holding up to one second worth of requests.
#[derive(Debug)]
struct RequestBucket {
    available: f64,
    per_second: f64,
    refilled_at: Instant,
}

impl RequestBucket {
    fn full(per_second: u32) -> Self {
        let per_second = f64::from(per_second);
        Self {
            available: per_second,
            per_second,
            refilled_at: Instant::now(),
        }
    }

    /// Takes a request slot, or reports how long until one frees up.
    fn take(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let earned = now.duration_since(self.refilled_at).as_secs_f64() * self.per_second;
        self.available = (self.available + earned).min(self.per_second);
        self.refilled_at = now;

        if self.available >= 1.0 {
            self.available -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.available) / self.per_second))
        }
    }
}

/// Request pacer shared between every Gemini client built by one factory.
///
/// A rate of 0 builds an unlimited pacer whose `acquire` never waits.
#[derive(Debug, Clone)]
pub struct SharedRateLimiter {
    bucket: Option<Arc<Mutex<RequestBucket>>>,
}

impl SharedRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let bucket = (requests_per_second > 0).then(|| Arc::new(Mutex::new(RequestBucket::full(requests_per_second))));
        Self { bucket }
    }

    pub fn is_enabled(&self) -> bool {
        self.bucket.is_some()
    }

    /// Waits for a request slot. The lock is held across the wait so callers
    /// are served in arrival order.
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        let mut bucket = bucket.lock().await;
        while let Err(wait) = bucket.take() {
            debug!("Gemini request pacing: waiting {:?}", wait);
            sleep(wait).await;
        }
    }
}

/// Retries transient request failures with the configured backoff.
#[derive(Debug, Clone)]
pub struct RetryHelper {
    config: RateLimitConfig,
}

impl RetryHelper {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Runs `operation` until it succeeds, fails with an error `is_retryable`
    /// rejects, or `max_retries` retries have been spent.
    pub async fn with_retry<T, E, F, Fut, R>(&self, operation: F, is_retryable: R) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut retries = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !is_retryable(&error) {
                return Err(error);
            }
            if retries == self.config.max_retries {
                warn!("Gemini request still failing after {} retries: {}", retries, error);
                return Err(error);
            }

            retries += 1;
            let delay = self.config.calculate_backoff_delay(retries);
            debug!(
                "Gemini request failed ({}); retry {}/{} in {:?} ({:?} backoff)",
                error, retries, self.config.max_retries, delay, self.config.backoff_strategy
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_backoff(max_retries: u32) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: 0,
            backoff_strategy: BackoffStrategy::Linear,
            max_retries,
            backoff_base_delay_ms: 1,
            backoff_max_delay_ms: 5,
        }
    }

    #[test]
    fn test_bucket_allows_one_second_burst() {
        let mut bucket = RequestBucket::full(2);
        assert!(bucket.take().is_ok());
        assert!(bucket.take().is_ok());
        let wait = bucket.take().unwrap_err();
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_zero_rate_is_unlimited() {
        let pacer = SharedRateLimiter::new(0);
        assert!(!pacer.is_enabled());
        for _ in 0..1000 {
            pacer.acquire().await;
        }
    }

    #[tokio::test]
    async fn test_clones_share_one_bucket() {
        let pacer = SharedRateLimiter::new(100);
        let clone = pacer.clone();
        assert!(clone.is_enabled());
        pacer.acquire().await;
        clone.acquire().await;

        let bucket = pacer.bucket.as_ref().unwrap().lock().await;
        assert!(bucket.available < 99.0);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let helper = RetryHelper::new(&quick_backoff(3));
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = helper
            .with_retry(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 { Err(format!("attempt {} failed", n)) } else { Ok(n) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let helper = RetryHelper::new(&quick_backoff(2));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = helper
            .with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("still failing".to_string())
                },
                |_| true,
            )
            .await;

        assert!(result.is_err());
        // First attempt plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let helper = RetryHelper::new(&quick_backoff(5));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = helper
            .with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("bad request".to_string())
                },
                |e| !e.contains("bad request"),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
