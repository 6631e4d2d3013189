//! Rate limiting utilities
//!
//! Token bucket limiters used to throttle workflow submissions. The plain
//! [`RateLimiter`] guards a single resource; [`KeyedRateLimiter`] keeps an
//! independent bucket per key (one bucket per user in practice).

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Token bucket rate limiter
///
/// Tokens refill continuously over the configured period up to capacity.
/// `check` consumes one token when available and never blocks.
///
/// # Example
///
/// ```rust,ignore
/// use tooling::rate_limit::RateLimiter;
/// use std::time::Duration;
///
/// // 30 executions per minute
/// let limiter = RateLimiter::new(30, Duration::from_secs(60));
/// if !limiter.check().await {
///     // rate limited
/// }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<BucketState>>,
}

struct BucketState {
    capacity: usize,
    tokens: f64,
    refill_period: Duration,
    last_refill: Instant,
}

impl BucketState {
    fn new(capacity: usize, refill_period: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_period,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);

        if elapsed >= self.refill_period {
            self.tokens = self.capacity as f64;
            self.last_refill = now;
            return;
        }

        let ratio = elapsed.as_secs_f64() / self.refill_period.as_secs_f64();
        let added = self.capacity as f64 * ratio;
        if added > 0.0 {
            self.tokens = (self.tokens + added).min(self.capacity as f64);
            self.last_refill = now;
        }
    }

    fn try_take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    /// Create a limiter allowing `max_operations` per `period`
    pub fn new(max_operations: usize, period: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BucketState::new(max_operations, period))),
        }
    }

    /// Consume one token if available (non-blocking)
    pub async fn check(&self) -> bool {
        self.state.lock().await.try_take()
    }

    /// Number of operations that could proceed immediately
    pub async fn available(&self) -> usize {
        let mut state = self.state.lock().await;
        state.refill();
        state.tokens.floor() as usize
    }

    /// Refill the bucket to capacity
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.tokens = state.capacity as f64;
        state.last_refill = Instant::now();
    }
}

/// Per-key token bucket limiter
///
/// Each key gets its own bucket with the shared capacity/period settings.
/// Buckets are created lazily on first use.
#[derive(Clone)]
pub struct KeyedRateLimiter {
    capacity: usize,
    period: Duration,
    buckets: Arc<DashMap<String, Arc<Mutex<BucketState>>>>,
}

impl KeyedRateLimiter {
    /// Create a keyed limiter allowing `max_operations` per `period` per key
    pub fn new(max_operations: usize, period: Duration) -> Self {
        Self {
            capacity: max_operations,
            period,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Consume one token from `key`'s bucket if available
    pub async fn check(&self, key: &str) -> bool {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BucketState::new(self.capacity, self.period))))
            .clone();
        let result = bucket.lock().await.try_take();
        result
    }

    /// Drop all per-key buckets
    pub fn clear(&self) {
        self.buckets.clear();
    }
}
