//! Circuit breaker with concurrency ceiling and operation timeout.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::context::CallContext;
use super::error::{Classify, PipelineError};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Budget for the whole guarded operation, retries included
    pub timeout: Duration,
    /// Calls allowed in flight at once
    pub max_concurrent: usize,
    /// Failure percentage (0-100) at which the circuit opens
    pub error_threshold: f64,
    /// Minimum failures in the window before the circuit may open
    pub volume_threshold: u32,
    /// Time spent open before a trial call is admitted
    pub sleep_window: Duration,
    /// Span of the rolling statistics window while closed. Outcomes are
    /// kept in ten buckets, so the oldest tenth ages out in one step.
    pub rolling_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_concurrent: 64,
            error_threshold: 50.0,
            volume_threshold: 5,
            sleep_window: Duration::from_secs(5),
            rolling_window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the breaker's statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub request_count: u32,
    pub last_failure: Option<Instant>,
}

impl CircuitSnapshot {
    /// Failure percentage within the rolling window.
    pub fn failure_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            f64::from(self.failure_count) * 100.0 / f64::from(self.request_count)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Ignored,
}

fn outcome_of<T, E: Classify>(result: &Result<T, PipelineError<E>>) -> Outcome {
    match result {
        Ok(_) => Outcome::Success,
        Err(PipelineError::Operation(err)) if err.is_dependency_failure() => Outcome::Failure,
        Err(PipelineError::Operation(_)) => Outcome::Success,
        Err(PipelineError::Exhausted { .. } | PipelineError::TimedOut { .. }) => Outcome::Failure,
        Err(_) => Outcome::Ignored,
    }
}

const WINDOW_BUCKETS: u32 = 10;

/// Outcomes recorded during one slice of the rolling window.
#[derive(Debug)]
struct Bucket {
    started: Instant,
    requests: u32,
    failures: u32,
}

#[derive(Debug)]
struct Stats {
    state: CircuitState,
    buckets: VecDeque<Bucket>,
    opened_at: Option<Instant>,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

impl Stats {
    fn clear_window(&mut self) {
        self.buckets.clear();
    }

    /// Drop buckets that started a full window ago or earlier.
    fn expire(&mut self, now: Instant, window: Duration) {
        while self
            .buckets
            .front()
            .is_some_and(|b| now.duration_since(b.started) >= window)
        {
            self.buckets.pop_front();
        }
    }

    fn count(&mut self, now: Instant, window: Duration, failed: bool) {
        self.expire(now, window);
        let width = (window / WINDOW_BUCKETS).max(Duration::from_nanos(1));
        if self
            .buckets
            .back()
            .is_none_or(|b| now.duration_since(b.started) >= width)
        {
            self.buckets.push_back(Bucket {
                started: now,
                requests: 0,
                failures: 0,
            });
        }
        if let Some(current) = self.buckets.back_mut() {
            current.requests = current.requests.saturating_add(1);
            if failed {
                current.failures = current.failures.saturating_add(1);
            }
        }
    }

    fn snapshot(&self) -> CircuitSnapshot {
        let (request_count, failure_count) = self.buckets.iter().fold((0u32, 0u32), |(r, f), b| {
            (r.saturating_add(b.requests), f.saturating_add(b.failures))
        });
        CircuitSnapshot {
            state: self.state,
            failure_count,
            request_count,
            last_failure: self.last_failure,
        }
    }
}

/// Closed / Open / HalfOpen breaker guarding one dependency.
///
/// State transitions happen under a short critical section that never spans
/// an `.await`. HalfOpen admits exactly one trial call; everything else is
/// rejected with `CircuitOpen` until the trial settles.
#[derive(Debug)]
pub struct CircuitBreaker {
    resource: String,
    config: CircuitBreakerConfig,
    stats: Mutex<Stats>,
    in_flight: Semaphore,
}

impl CircuitBreaker {
    pub fn new(resource: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let max_concurrent = config.max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            resource: resource.into(),
            stats: Mutex::new(Stats {
                state: CircuitState::Closed,
                buckets: VecDeque::with_capacity(WINDOW_BUCKETS as usize + 1),
                opened_at: None,
                last_failure: None,
                trial_in_flight: false,
            }),
            in_flight: Semaphore::new(max_concurrent),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut stats = self.lock();
        stats.expire(Instant::now(), self.config.rolling_window);
        stats.snapshot()
    }

    /// Run `call` if the circuit admits it, bounded by the configured timeout
    /// (or the context deadline, whichever comes first), and record the
    /// outcome.
    pub async fn execute<T, E, F, Fut>(&self, ctx: &CallContext, call: F) -> Result<T, PipelineError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PipelineError<E>>>,
        E: Classify,
    {
        let _slot = self.in_flight.try_acquire().map_err(|_| {
            tracing::warn!(resource = %self.resource, max_concurrent = self.config.max_concurrent, "rejected: saturated");
            PipelineError::Saturated {
                resource: self.resource.clone(),
                max_concurrent: self.config.max_concurrent,
            }
        })?;

        let mut admission = self.admit()?;

        let mut deadline = Instant::now() + self.config.timeout;
        if let Some(ctx_deadline) = ctx.deadline() {
            deadline = deadline.min(ctx_deadline);
        }

        let result = match tokio::time::timeout_at(deadline, call()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(resource = %self.resource, timeout_ms = self.config.timeout.as_millis() as u64, "guarded operation timed out");
                Err(PipelineError::TimedOut {
                    resource: self.resource.clone(),
                })
            }
        };

        admission.settle(outcome_of(&result));
        result
    }

    fn admit<E>(&self) -> Result<Admission<'_>, PipelineError<E>> {
        let now = Instant::now();
        let mut stats = self.lock();

        match stats.state {
            CircuitState::Closed => {
                tracing::debug!(resource = %self.resource, "admitted");
                Ok(Admission::new(self, false))
            }
            CircuitState::Open => {
                let opened_at = stats.opened_at.unwrap_or(now);
                if now.duration_since(opened_at) >= self.config.sleep_window {
                    self.transition(&mut stats, CircuitState::HalfOpen, now);
                    stats.trial_in_flight = true;
                    Ok(Admission::new(self, true))
                } else {
                    Err(self.rejected())
                }
            }
            CircuitState::HalfOpen => {
                if stats.trial_in_flight {
                    Err(self.rejected())
                } else {
                    stats.trial_in_flight = true;
                    Ok(Admission::new(self, true))
                }
            }
        }
    }

    fn record(&self, trial: bool, outcome: Outcome) {
        let now = Instant::now();
        let mut stats = self.lock();

        if trial {
            stats.trial_in_flight = false;
            match outcome {
                Outcome::Success => {
                    self.transition(&mut stats, CircuitState::Closed, now);
                    stats.clear_window();
                }
                Outcome::Failure => {
                    stats.last_failure = Some(now);
                    self.transition(&mut stats, CircuitState::Open, now);
                }
                Outcome::Ignored => {}
            }
            return;
        }

        // Calls admitted while closed may finish after another call opened the circuit.
        if stats.state != CircuitState::Closed || outcome == Outcome::Ignored {
            return;
        }

        let failed = outcome == Outcome::Failure;
        stats.count(now, self.config.rolling_window, failed);
        if failed {
            stats.last_failure = Some(now);

            let snapshot = stats.snapshot();
            if snapshot.failure_count >= self.config.volume_threshold
                && snapshot.failure_rate() >= self.config.error_threshold
            {
                self.transition(&mut stats, CircuitState::Open, now);
            }
        }
    }

    fn transition(&self, stats: &mut Stats, to: CircuitState, now: Instant) {
        let from = stats.state;
        if from == to {
            return;
        }
        stats.state = to;
        if to == CircuitState::Open {
            stats.opened_at = Some(now);
        }
        let snapshot = stats.snapshot();
        tracing::info!(
            resource = %self.resource,
            from = %from,
            to = %to,
            failure_count = snapshot.failure_count,
            request_count = snapshot.request_count,
            "circuit state changed"
        );
    }

    fn rejected<E>(&self) -> PipelineError<E> {
        tracing::warn!(resource = %self.resource, "rejected: circuit open");
        PipelineError::CircuitOpen {
            resource: self.resource.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Stats> {
        // Stats stay consistent even if a holder panicked; every update is a
        // plain field write.
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admitted call. A trial dropped before settling (the caller went away)
/// frees the HalfOpen slot so the next call can be tried.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Admission<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;
        self.breaker.record(self.trial, outcome);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record(self.trial, Outcome::Ignored);
        }
    }
}
