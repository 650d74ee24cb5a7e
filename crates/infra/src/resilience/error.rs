//! Failure classification and pipeline errors.

use std::time::Duration;

use thiserror::Error;

/// Backend-independent failure taxonomy.
///
/// Backends translate their native errors into one of these; the pipeline
/// only ever looks at the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The request or the stored data is invalid. Never retried.
    Validation,
    /// The target does not exist. Never retried.
    NotFound,
    /// Expected to resolve on its own (timeouts, resets, failover).
    Transient,
    /// Will fail again no matter how often it is retried.
    Permanent,
}

/// Implemented by operation errors the pipeline guards.
pub trait Classify {
    fn failure_class(&self) -> FailureClass;

    fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }

    /// Whether the failure says something about the dependency's health.
    /// Validation and not-found answers come from a healthy backend.
    fn is_dependency_failure(&self) -> bool {
        matches!(
            self.failure_class(),
            FailureClass::Transient | FailureClass::Permanent
        )
    }
}

/// Error surfaced by a guarded call.
#[derive(Debug, Error)]
pub enum PipelineError<E> {
    /// Rejected at admission; no token was available.
    #[error("rate limit exceeded for '{resource}' (next token in {retry_after:?})")]
    RateLimited {
        resource: String,
        retry_after: Duration,
    },

    /// Rejected by an open (or probing) circuit; the operation never ran.
    #[error("circuit '{resource}' is open")]
    CircuitOpen { resource: String },

    /// Rejected because the concurrent-call ceiling was reached.
    #[error("'{resource}' is saturated ({max_concurrent} calls in flight)")]
    Saturated {
        resource: String,
        max_concurrent: usize,
    },

    /// The guarded operation as a whole exceeded its time budget.
    #[error("'{resource}' timed out")]
    TimedOut { resource: String },

    #[error("call to '{resource}' was cancelled")]
    Cancelled { resource: String },

    /// Transient failures persisted through every allowed attempt.
    #[error("'{resource}' failed after {attempts} attempt(s): {last}")]
    Exhausted {
        resource: String,
        attempts: u32,
        #[source]
        last: E,
    },

    /// Non-retryable failure from the operation, surfaced on first sight.
    #[error(transparent)]
    Operation(E),
}

impl<E> PipelineError<E> {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::CircuitOpen { .. } => "circuit_open",
            PipelineError::Saturated { .. } => "saturated",
            PipelineError::TimedOut { .. } => "timed_out",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Exhausted { .. } => "retries_exhausted",
            PipelineError::Operation(_) => "operation",
        }
    }
}
