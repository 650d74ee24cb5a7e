//! Token-bucket rate limiter.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use super::context::CallContext;

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Sustained refill rate
    pub requests_per_second: f64,
    /// Bucket capacity; the largest burst admitted at once
    pub burst_size: u32,
    /// How long a caller may wait for the next token (zero = fail fast)
    pub max_wait: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 100.0,
            burst_size: 50,
            max_wait: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("no token available (next in {retry_after:?})")]
    Exhausted { retry_after: Duration },
    #[error("cancelled while waiting for a token")]
    Cancelled,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    resource: String,
    config: RateLimiterConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(resource: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            resource: resource.into(),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.burst_size.max(1)),
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn capacity(&self) -> f64 {
        f64::from(self.config.burst_size.max(1))
    }

    /// Take a token if one is available. On failure returns how long until
    /// the next token arrives.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - bucket.tokens;
        if self.config.requests_per_second <= 0.0 {
            return Err(Duration::MAX);
        }
        // A vanishingly small rate overflows Duration; treat it as never.
        Err(Duration::try_from_secs_f64(missing / self.config.requests_per_second)
            .unwrap_or(Duration::MAX))
    }

    /// Take a token, waiting up to `max_wait` for one to arrive.
    pub async fn acquire(&self, ctx: &CallContext) -> Result<(), AcquireError> {
        let give_up_at = Instant::now() + self.config.max_wait;

        loop {
            let retry_after = match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            let now = Instant::now();
            if retry_after > give_up_at.saturating_duration_since(now) {
                tracing::warn!(
                    resource = %self.resource,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "rejected: rate limit exceeded"
                );
                return Err(AcquireError::Exhausted { retry_after });
            }

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(AcquireError::Cancelled),
                _ = tokio::time::sleep(retry_after) => {}
            }
        }
    }

    /// Tokens currently in the bucket (after refill).
    pub fn available(&self) -> f64 {
        let now = Instant::now();
        let mut bucket = self.lock();
        self.refill(&mut bucket, now);
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let added = elapsed * self.config.requests_per_second.max(0.0);
        bucket.tokens = (bucket.tokens + added).min(self.capacity());
        bucket.last_refill = now;
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
