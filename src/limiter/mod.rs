//! Sliding-window rate limiting for the generation provider.
//!
//! The provider imposes three independent per-minute budgets: requests,
//! input tokens, and output tokens. `RateLimiter::acquire` blocks until one
//! more request fits under all three, then records it. Admission is
//! single-flight: at most one caller is inside `acquire` at a time, so the
//! effective downstream concurrency is 1 no matter how many jobs are active.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Trailing window over which the budgets apply.
const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub max_requests_per_minute: usize,
    pub max_input_tokens_per_minute: u64,
    pub max_output_tokens_per_minute: u64,
    /// Floor between successive admissions even when budgets are free.
    pub min_request_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 1000,
            max_input_tokens_per_minute: 450000,
            max_output_tokens_per_minute: 90000,
            min_request_interval: Duration::from_millis(100),
        }
    }
}

impl From<&crate::config::RateLimitConfig> for LimiterConfig {
    fn from(cfg: &crate::config::RateLimitConfig) -> Self {
        Self {
            max_requests_per_minute: cfg.max_requests_per_minute,
            max_input_tokens_per_minute: cfg.max_input_tokens_per_minute,
            max_output_tokens_per_minute: cfg.max_output_tokens_per_minute,
            min_request_interval: Duration::from_millis(cfg.min_request_interval_ms),
        }
    }
}

/// The three windows, pruned of entries older than 60s on every check.
#[derive(Debug, Default)]
struct Windows {
    requests: VecDeque<Instant>,
    input_tokens: VecDeque<(Instant, u64)>,
    output_tokens: VecDeque<(Instant, u64)>,
    last_request: Option<Instant>,
}

impl Windows {
    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(WINDOW) else {
            return;
        };
        while self.requests.front().is_some_and(|t| *t <= cutoff) {
            self.requests.pop_front();
        }
        while self.input_tokens.front().is_some_and(|(t, _)| *t <= cutoff) {
            self.input_tokens.pop_front();
        }
        while self.output_tokens.front().is_some_and(|(t, _)| *t <= cutoff) {
            self.output_tokens.pop_front();
        }
    }

    /// Wait until the oldest entry of `window_start` ages out, plus one
    /// second of slack: `60 - (now - oldest) + 1`.
    fn wait_for(now: Instant, oldest: Instant) -> Duration {
        WINDOW.saturating_sub(now - oldest) + Duration::from_secs(1)
    }

    /// First exceeded budget's wait, or None when the request fits.
    fn next_wait(&self, now: Instant, config: &LimiterConfig, est_in: u64, est_out: u64) -> Option<(&'static str, Duration)> {
        if self.requests.len() >= config.max_requests_per_minute {
            let oldest = *self.requests.front()?;
            return Some(("requests", Self::wait_for(now, oldest)));
        }

        let input_usage: u64 = self.input_tokens.iter().map(|(_, n)| n).sum();
        if input_usage + est_in > config.max_input_tokens_per_minute {
            if let Some((oldest, _)) = self.input_tokens.front() {
                return Some(("input_tokens", Self::wait_for(now, *oldest)));
            }
        }

        let output_usage: u64 = self.output_tokens.iter().map(|(_, n)| n).sum();
        if output_usage + est_out > config.max_output_tokens_per_minute {
            if let Some((oldest, _)) = self.output_tokens.front() {
                return Some(("output_tokens", Self::wait_for(now, *oldest)));
            }
        }

        None
    }
}

/// Paces outbound provider calls against the three per-minute budgets.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    // Held across the suspension points below: this async mutex IS the
    // single-flight gate.
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows::default()),
        }
    }

    /// Block until one downstream request is safe, then record it.
    ///
    /// Never rejects, only delays. Token amounts are estimates supplied by
    /// the caller; the windows are charged with the estimates, not measured
    /// usage.
    pub async fn acquire(&self, estimated_input_tokens: u64, estimated_output_tokens: u64) {
        let mut windows = self.windows.lock().await;

        // Enforce minimum interval between requests
        if let Some(last) = windows.last_request {
            let since = last.elapsed();
            if since < self.config.min_request_interval {
                tokio::time::sleep(self.config.min_request_interval - since).await;
            }
        }

        // Budgets are re-checked from scratch after every wait, since time
        // has passed and other windows need re-pruning too.
        loop {
            let now = Instant::now();
            windows.prune(now);

            match windows.next_wait(now, &self.config, estimated_input_tokens, estimated_output_tokens) {
                None => break,
                Some((budget, wait)) => {
                    tracing::info!(
                        budget = budget,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limit budget reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let now = Instant::now();
        windows.requests.push_back(now);
        windows.input_tokens.push_back((now, estimated_input_tokens));
        windows.output_tokens.push_back((now, estimated_output_tokens));
        windows.last_request = Some(now);
    }

    /// Number of requests currently inside the trailing window.
    pub async fn recorded_requests(&self) -> usize {
        let mut windows = self.windows.lock().await;
        windows.prune(Instant::now());
        windows.requests.len()
    }

    /// Timestamps of requests currently inside the trailing window.
    pub async fn request_times(&self) -> Vec<Instant> {
        let mut windows = self.windows.lock().await;
        windows.prune(Instant::now());
        windows.requests.iter().copied().collect()
    }
}
