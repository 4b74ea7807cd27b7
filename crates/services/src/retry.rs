use std::future::Future;
use std::time::Duration;

use backend::ApiConfig;

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            jitter_max: Some(Duration::from_millis(250)),
        }
    }
}

impl RetryConfig {
    /// Attempts and base delay taken from the API settings.
    #[must_use]
    pub fn from_api(config: &ApiConfig) -> Self {
        let base = config.retry_delay();
        Self {
            max_attempts: config.retry_attempts().max(1),
            base_backoff: base,
            max_backoff: base * 8,
            jitter_max: Some(base / 4),
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::random::<u64>() % (max_ms + 1))
}

/// Run `f` until it succeeds, `should_retry` rejects the error, or attempts run out.
///
/// # Errors
///
/// Returns the last error produced by `f`.
pub async fn retry_async_when<F, Fut, T, E, P>(
    config: RetryConfig,
    mut f: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !should_retry(&err) {
                    return Err(err);
                }

                let wait = backoff + config.jitter_max.map_or(Duration::ZERO, jitter);
                tokio::time::sleep(wait).await;
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            jitter_max: None,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let res: Result<u32, &'static str> = retry_async_when(
            fast(3),
            || async {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("flaky") } else { Ok(n) }
            },
            |_| true,
        )
        .await;

        assert_eq!(res, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_max_attempts() {
        let counter = AtomicU32::new(0);
        let res: Result<(), &'static str> = retry_async_when(
            fast(2),
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("down")
            },
            |_| true,
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let res: Result<(), &'static str> = retry_async_when(
            fast(5),
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("bad request")
            },
            |err| *err != "bad request",
        )
        .await;

        assert!(res.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn derives_from_api_settings() {
        let retry = RetryConfig::from_api(&ApiConfig::default());
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_backoff, Duration::from_secs(1));
        assert_eq!(retry.max_backoff, Duration::from_secs(8));
    }
}
