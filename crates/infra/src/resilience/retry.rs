//! Retry with exponential backoff for transient failures.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::context::CallContext;
use super::error::{Classify, PipelineError};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, the first call included (1 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Growth factor applied per retry
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0), added on top of the base delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn exponential(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            ..Default::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry `n` (1-indexed) without jitter:
    /// `min(max_backoff, initial_backoff * multiplier^(n-1))`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = self.multiplier.max(1.0).powi(retry.saturating_sub(1) as i32);
        let scaled = (self.initial_backoff.as_nanos() as f64 * exp).round();
        if !scaled.is_finite() || scaled >= self.max_backoff.as_nanos() as f64 {
            return self.max_backoff;
        }
        Duration::from_nanos(scaled as u64)
    }

    /// Delay before retry `n` with jitter applied, capped at `max_backoff` and
    /// never shorter than `previous`.
    pub fn delay_for_retry(&self, retry: u32, previous: Duration) -> Duration {
        let base = self.base_delay(retry);
        let spread = (base.as_nanos() as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        let jitter = if spread > 0 {
            rand::thread_rng().gen_range(0..spread)
        } else {
            0
        };
        let delay = (base + Duration::from_nanos(jitter)).min(self.max_backoff);
        delay.max(previous)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Runs an operation under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retry {
    resource: String,
    policy: RetryPolicy,
}

impl Retry {
    pub fn new(resource: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            resource: resource.into(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `op` until it succeeds, fails non-retryably, runs out of
    /// attempts or the call is cancelled.
    pub async fn run<T, E, F, Fut>(&self, ctx: &CallContext, mut op: F) -> Result<T, PipelineError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let mut attempts = 0u32;
        let mut previous = Duration::ZERO;

        loop {
            if ctx.is_cancelled() {
                return Err(self.cancelled());
            }
            attempts += 1;

            let outcome = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(self.cancelled()),
                outcome = op() => outcome,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::debug!(resource = %self.resource, attempts, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(PipelineError::Operation(err));
            }

            if !self.policy.should_retry(attempts) {
                tracing::warn!(
                    resource = %self.resource,
                    attempts,
                    error = %err,
                    "retries exhausted"
                );
                return Err(PipelineError::Exhausted {
                    resource: self.resource.clone(),
                    attempts,
                    last: err,
                });
            }

            let delay = self.policy.delay_for_retry(attempts, previous);
            previous = delay;
            tracing::warn!(
                resource = %self.resource,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, backing off"
            );

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(self.cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn cancelled<E>(&self) -> PipelineError<E> {
        PipelineError::Cancelled {
            resource: self.resource.clone(),
        }
    }
}
