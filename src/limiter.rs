use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::{
    metrics::Metrics,
    sweeper::Sweep,
    utils::{ceil_secs_at_least_one, system_clock, Clock},
};

/// Seconds over which a full bucket refills
const REFILL_WINDOW_SECS: f64 = 60.0;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub admitted: bool,
    /// Advisory wait before retrying; zero when admitted
    pub retry_after_secs: u64,
}

impl Decision {
    fn admit() -> Self {
        Self {
            admitted: true,
            retry_after_secs: 0,
        }
    }

    fn deny(retry_after_secs: u64) -> Self {
        Self {
            admitted: false,
            retry_after_secs,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-client token bucket limiter
///
/// Each key may burst up to `capacity` requests and earns tokens back at
/// `capacity` per minute. Buckets untouched for longer than the idle TTL are
/// dropped by [`RateLimiter::sweep`].
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    capacity: f64,
    idle_ttl: Duration,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl RateLimiter {
    /// Create a limiter allowing `capacity` requests per rolling minute per key
    pub fn new(capacity: u32, idle_ttl: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            idle_ttl,
            clock: system_clock(),
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Decide whether a request from `key` may proceed, consuming a token if so
    pub fn allow(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let mut buckets = self.lock();

        let decision = match buckets.get_mut(key) {
            None => {
                buckets.insert(
                    key.to_string(),
                    TokenBucket {
                        tokens: self.capacity - 1.0,
                        last_refill: now,
                    },
                );
                Decision::admit()
            }
            Some(bucket) => self.take(bucket, now),
        };
        let tracked = buckets.len();
        drop(buckets);

        if let Some(metrics) = &self.metrics {
            if decision.admitted {
                metrics.record_admitted();
            } else {
                metrics.record_denied();
            }
            metrics.set_active_buckets(tracked);
        }

        if !decision.admitted {
            debug!(
                key,
                retry_after_secs = decision.retry_after_secs,
                "Request denied by rate limiter"
            );
        }

        decision
    }

    fn take(&self, bucket: &mut TokenBucket, now: Instant) -> Decision {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        if !elapsed.is_zero() {
            // Multiply first: one refill period must yield exactly one token.
            let earned = elapsed.as_secs_f64() * self.capacity / REFILL_WINDOW_SECS;
            bucket.tokens = (bucket.tokens + earned).min(self.capacity);
            bucket.last_refill = now;
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Decision::admit();
        }

        let wait = (1.0 - bucket.tokens) * REFILL_WINDOW_SECS / self.capacity;
        Decision::deny(ceil_secs_at_least_one(wait))
    }

    /// Drop buckets idle for longer than the TTL, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut buckets = self.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= self.idle_ttl);
        let removed = before - buckets.len();
        let tracked = buckets.len();
        drop(buckets);

        if let Some(metrics) = &self.metrics {
            metrics.record_evicted_buckets(removed);
            metrics.set_active_buckets(tracked);
        }
        if removed > 0 {
            info!(removed, tracked, "Evicted idle rate limit buckets");
        }

        removed
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tokens left for `key` as of its last check
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.lock().get(key).map(|bucket| bucket.tokens)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Tokens earned per second
    pub fn refill_rate(&self) -> f64 {
        self.capacity / REFILL_WINDOW_SECS
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &'static str {
        "rate-limiter"
    }

    fn sweep(&self) -> usize {
        RateLimiter::sweep(self)
    }
}
