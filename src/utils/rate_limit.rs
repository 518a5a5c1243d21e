//! Outbound call throttling
//!
//! Token bucket shared by every fetch in a cycle. Callers never wait:
//! an empty bucket means "skip for now", the scheduler picks the
//! address up again on the next tick.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Bucket size (burst)
    pub capacity: u32,
    /// Tokens added per refill period
    pub refill_amount: u32,
    /// Refill period
    pub refill_every: Duration,
}

impl RateLimitConfig {
    /// `n` calls per second, burst of `n`
    pub fn per_second(n: u32) -> Self {
        Self {
            capacity: n,
            refill_amount: n,
            refill_every: Duration::from_secs(1),
        }
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// In-process token bucket
pub struct TokenBucket {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            bucket: Mutex::new(Bucket {
                tokens: config.capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Same as `try_acquire` with an explicit clock reading
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            debug!("🚦 Rate limit reached ({} tokens left)", bucket.tokens);
            false
        }
    }

    /// Whole tokens currently available
    pub fn available(&self) -> u32 {
        let mut bucket = match self.bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.refill(&mut bucket, Instant::now());
        bucket.tokens.floor() as u32
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let period = self.config.refill_every.as_secs_f64();
        if period <= 0.0 {
            bucket.tokens = self.config.capacity as f64;
            bucket.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        let added = elapsed / period * self.config.refill_amount as f64;
        bucket.tokens = (bucket.tokens + added).min(self.config.capacity as f64);
        bucket.last_refill = now;
    }
}
