//! Resilience pipeline for calls into external dependencies.
//!
//! Composition, outermost first: rate limiter, circuit breaker, retry, then
//! the operation itself. Each stage is usable on its own.

pub mod circuit_breaker;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use context::CallContext;
pub use error::{Classify, FailureClass, PipelineError};
pub use pipeline::{PipelineConfig, ResiliencePipeline};
pub use rate_limiter::{AcquireError, RateLimiter, RateLimiterConfig};
pub use retry::{Retry, RetryPolicy};
