//! RateLimiter -> CircuitBreaker -> Retry -> operation.

use std::fmt::Display;
use std::future::Future;

use serde::{Deserialize, Serialize};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::context::CallContext;
use super::error::{Classify, PipelineError};
use super::rate_limiter::{AcquireError, RateLimiter, RateLimiterConfig};
use super::retry::{Retry, RetryPolicy};

/// Settings for every stage of a [`ResiliencePipeline`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub circuit: CircuitBreakerConfig,
    pub rate: RateLimiterConfig,
}

/// One guarded dependency.
///
/// The limiter decides admission, the breaker decides whether the dependency
/// is worth calling and bounds the whole attempt sequence in time, and retry
/// absorbs transient failures inside that budget.
#[derive(Debug)]
pub struct ResiliencePipeline {
    resource: String,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    retry: Retry,
}

impl ResiliencePipeline {
    pub fn new(resource: impl Into<String>, config: PipelineConfig) -> Self {
        let resource = resource.into();
        Self {
            limiter: RateLimiter::new(resource.clone(), config.rate),
            breaker: CircuitBreaker::new(resource.clone(), config.circuit),
            retry: Retry::new(resource.clone(), config.retry),
            resource,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run `op` through every stage. `op` is invoked once per attempt.
    pub async fn execute<T, E, F, Fut>(&self, ctx: &CallContext, op: F) -> Result<T, PipelineError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled {
                resource: self.resource.clone(),
            });
        }

        self.limiter.acquire(ctx).await.map_err(|err| match err {
            AcquireError::Exhausted { retry_after } => PipelineError::RateLimited {
                resource: self.resource.clone(),
                retry_after,
            },
            AcquireError::Cancelled => PipelineError::Cancelled {
                resource: self.resource.clone(),
            },
        })?;

        self.breaker.execute(ctx, || self.retry.run(ctx, op)).await
    }
}
