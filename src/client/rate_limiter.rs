//! Per-model request pacing.
//!
//! Hosted endpoints throttle aggressively (Gemini in particular), so each
//! endpoint may enforce a minimum spacing between consecutive requests to
//! the same model. Exhaustion signals are counted here; the sleep-and-retry
//! itself lives in the client's retry loop.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Pacing state for a single model.
#[derive(Debug, Default)]
pub struct ModelPacingState {
    /// When the next request may be sent
    pub next_slot: Option<Instant>,
    /// Requests sent
    pub requests: u64,
    /// Capacity signals (429 / 529 / RESOURCE_EXHAUSTED) received
    pub exhausted: u64,
}

impl ModelPacingState {
    /// Time to wait before the next request may go out.
    pub fn wait_time(&self, now: Instant) -> Duration {
        self.next_slot
            .filter(|&t| t > now)
            .map_or(Duration::ZERO, |t| t - now)
    }
}

/// Minimum-interval rate limiter keyed by model id.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    states: DashMap<String, ModelPacingState>,
    total_requests: AtomicU64,
    total_exhausted: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl RateLimiter {
    /// Create a limiter spacing requests to the same model by `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            states: DashMap::new(),
            total_requests: AtomicU64::new(0),
            total_exhausted: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Reserve the next slot for `model`, sleeping until it opens.
    ///
    /// Returns the duration waited.
    pub async fn acquire(&self, model: &str) -> Duration {
        let wait = {
            // Reserve under the shard lock so concurrent callers queue up
            let now = Instant::now();
            let mut state = self.states.entry(model.to_string()).or_default();
            let wait = state.wait_time(now);
            state.next_slot = Some(now + wait + self.min_interval);
            state.requests += 1;
            wait
        };
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if wait > Duration::ZERO {
            debug!(
                model = model,
                wait_ms = wait.as_millis() as u64,
                "Pacing request"
            );
            self.total_wait_ms
                .fetch_add(wait.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(wait).await;
        }

        wait
    }

    /// Record a capacity signal for `model`.
    pub fn record_exhausted(&self, model: &str) {
        self.total_exhausted.fetch_add(1, Ordering::Relaxed);
        self.states.entry(model.to_string()).or_default().exhausted += 1;
    }

    /// Requests and capacity signals recorded for one model.
    pub fn model_counts(&self, model: &str) -> (u64, u64) {
        self.states
            .get(model)
            .map_or((0, 0), |s| (s.requests, s.exhausted))
    }

    pub fn stats(&self) -> RateLimiterStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_exhausted = self.total_exhausted.load(Ordering::Relaxed);
        let total_wait_ms = self.total_wait_ms.load(Ordering::Relaxed);

        RateLimiterStats {
            total_requests,
            total_exhausted,
            total_wait_secs: total_wait_ms as f64 / 1000.0,
            exhausted_ratio: if total_requests > 0 {
                total_exhausted as f64 / total_requests as f64
            } else {
                0.0
            },
            models_tracked: self.states.len(),
        }
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub total_exhausted: u64,
    pub total_wait_secs: f64,
    pub exhausted_ratio: f64,
    pub models_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::default();
        for _ in 0..3 {
            assert_eq!(limiter.acquire("m").await, Duration::ZERO);
        }
        assert_eq!(limiter.model_counts("m"), (3, 0));
    }

    #[tokio::test]
    async fn test_interval_spaces_requests_per_model() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        assert_eq!(limiter.acquire("a").await, Duration::ZERO);
        // A different model has its own slot
        assert_eq!(limiter.acquire("b").await, Duration::ZERO);

        let start = Instant::now();
        let waited = limiter.acquire("a").await;
        assert!(waited > Duration::ZERO);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_stats_track_exhaustion() {
        let limiter = RateLimiter::default();
        limiter.record_exhausted("gemini");
        limiter.record_exhausted("gemini");

        let stats = limiter.stats();
        assert_eq!(stats.total_exhausted, 2);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.exhausted_ratio, 0.0);
        assert_eq!(limiter.model_counts("gemini"), (0, 2));
    }
}
