//! Bounded-backoff retry around a single remote generation call.
//!
//! Rate-limit rejections back off long (10, 30, 90s); anything else backs
//! off short (2, 4s). Exhausting the budget on rate limits yields the
//! distinguished `RateLimitExhausted` error, which the job loop treats as a
//! transient condition rather than job failure.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProseforgeError, Result};
use crate::limiter::RateLimiter;

/// Static per-call token estimates charged to the limiter windows.
///
/// Real token counts vary; these are fixed configuration, a known
/// approximation carried over from the provider defaults.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimates {
    pub input: u64,
    pub output: u64,
}

impl Default for TokenEstimates {
    fn default() -> Self {
        Self {
            input: 4000,
            output: 2000,
        }
    }
}

impl From<&crate::config::RateLimitConfig> for TokenEstimates {
    fn from(cfg: &crate::config::RateLimitConfig) -> Self {
        Self {
            input: cfg.estimated_input_tokens,
            output: cfg.estimated_output_tokens,
        }
    }
}

/// Run `operation` up to `max_attempts` times, pacing every attempt through
/// the rate limiter.
///
/// Success on any attempt short-circuits and returns the result. On
/// exhaustion the original error is returned, except for rate limits which
/// collapse into `RateLimitExhausted`.
pub async fn call_with_retry<T, F, Fut>(
    limiter: &RateLimiter,
    estimates: TokenEstimates,
    max_attempts: u32,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..max_attempts {
        limiter.acquire(estimates.input, estimates.output).await;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_rate_limit() {
            if attempt + 1 < max_attempts {
                // 10, 30, 90 seconds
                let wait = 10 * 3u64.pow(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    wait_secs = wait,
                    "Rate limit hit, retrying"
                );
                tokio::time::sleep(Duration::from_secs(wait)).await;
            } else {
                tracing::error!(max_attempts, "Rate limit exceeded, deferring to caller");
                return Err(ProseforgeError::RateLimitExhausted { attempts: max_attempts });
            }
        } else if attempt + 1 < max_attempts {
            let wait = 2 * (u64::from(attempt) + 1);
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts,
                wait_secs = wait,
                error = %err,
                "API error, retrying"
            );
            tokio::time::sleep(Duration::from_secs(wait)).await;
        } else {
            return Err(err);
        }
    }

    Err(ProseforgeError::Llm("Max retries exceeded".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::LimiterConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn unthrottled() -> RateLimiter {
        RateLimiter::new(LimiterConfig {
            min_request_interval: Duration::ZERO,
            ..LimiterConfig::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let limiter = unthrottled();
        let calls = Arc::new(AtomicU32::new(0));

        let result = call_with_retry(&limiter, TokenEstimates::default(), 3, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProseforgeError>("text".to_string())
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "text");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let limiter = unthrottled();
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let result = call_with_retry(&limiter, TokenEstimates::default(), 3, || {
            let calls = calls.clone();
            async move {
                // Fail with 429 exactly twice, then succeed
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProseforgeError::RateLimited { retry_after_secs: 5 })
                } else {
                    Ok("recovered".to_string())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoffs of 10s then 30s elapsed before the success
        assert!(start.elapsed() >= Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_is_distinguished() {
        let limiter = unthrottled();
        let calls = Arc::new(AtomicU32::new(0));

        let err = call_with_retry(&limiter, TokenEstimates::default(), 3, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(ProseforgeError::RateLimited { retry_after_secs: 1 })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, ProseforgeError::RateLimitExhausted { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_error_short_backoff_then_success() {
        let limiter = unthrottled();
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let result = call_with_retry(&limiter, TokenEstimates::default(), 3, || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProseforgeError::Llm("connection reset".to_string()))
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // 2s short backoff, well below the 10s rate-limit backoff
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_error_exhaustion_returns_original() {
        let limiter = unthrottled();

        let err = call_with_retry(&limiter, TokenEstimates::default(), 2, || async {
            Err::<String, _>(ProseforgeError::Llm("boom".to_string()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ProseforgeError::Llm(msg) if msg == "boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_detected_from_text() {
        let limiter = unthrottled();
        let calls = Arc::new(AtomicU32::new(0));

        // A generic Llm error whose text carries the 429 marker takes the
        // rate-limit path, not the short backoff.
        let err = call_with_retry(&limiter, TokenEstimates::default(), 2, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(ProseforgeError::Llm("API error 429: overloaded".to_string()))
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ProseforgeError::RateLimitExhausted { attempts: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_passes_through_limiter() {
        let limiter = unthrottled();
        let calls = Arc::new(AtomicU32::new(0));

        let _ = call_with_retry(&limiter, TokenEstimates::default(), 3, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(ProseforgeError::Llm("boom".to_string()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.recorded_requests().await, 3);
    }

    #[test]
    fn test_token_estimates_from_config() {
        let cfg = crate::config::RateLimitConfig::default();
        let est = TokenEstimates::from(&cfg);
        assert_eq!(est.input, 4000);
        assert_eq!(est.output, 2000);
    }
}
