use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use kinship_core::{FamilyId, PersonId};
use kinship_family::Family;

use crate::resilience::{CallContext, Classify, FailureClass, PipelineError};

/// Failure reported by a storage backend, already translated out of the
/// backend's native error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record (or the request) is invalid, e.g. a stored family that no
    /// longer satisfies the aggregate invariants.
    #[error("invalid record: {0}")]
    ValidationFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Connection loss, pool timeout, serialization conflict, failover.
    #[error("transient backend failure: {0}")]
    Transient(String),

    #[error("backend failure: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn family_not_found(id: &FamilyId) -> Self {
        Self::NotFound(format!("family {id}"))
    }
}

impl Classify for StoreError {
    fn failure_class(&self) -> FailureClass {
        match self {
            StoreError::ValidationFailure(_) => FailureClass::Validation,
            StoreError::NotFound(_) => FailureClass::NotFound,
            StoreError::Transient(_) => FailureClass::Transient,
            StoreError::Permanent(_) => FailureClass::Permanent,
        }
    }
}

/// Native persistence for families.
///
/// Implementations do plain I/O and error translation only; admission,
/// retries and circuit breaking are layered on top by
/// [`GuardedFamilyRepository`](super::GuardedFamilyRepository).
#[async_trait]
pub trait FamilyStore: Send + Sync {
    /// Short backend name used in logs.
    fn backend(&self) -> &'static str;

    async fn load(&self, id: &FamilyId) -> Result<Family, StoreError>;

    /// Insert or replace (last write wins).
    async fn store(&self, family: &Family) -> Result<(), StoreError>;

    async fn load_by_parent(&self, parent_id: &PersonId) -> Result<Vec<Family>, StoreError>;

    async fn load_by_child(&self, child_id: &PersonId) -> Result<Family, StoreError>;

    async fn load_all(&self) -> Result<Vec<Family>, StoreError>;
}

#[async_trait]
impl<S> FamilyStore for Arc<S>
where
    S: FamilyStore + ?Sized,
{
    fn backend(&self) -> &'static str {
        (**self).backend()
    }

    async fn load(&self, id: &FamilyId) -> Result<Family, StoreError> {
        (**self).load(id).await
    }

    async fn store(&self, family: &Family) -> Result<(), StoreError> {
        (**self).store(family).await
    }

    async fn load_by_parent(&self, parent_id: &PersonId) -> Result<Vec<Family>, StoreError> {
        (**self).load_by_parent(parent_id).await
    }

    async fn load_by_child(&self, child_id: &PersonId) -> Result<Family, StoreError> {
        (**self).load_by_child(child_id).await
    }

    async fn load_all(&self) -> Result<Vec<Family>, StoreError> {
        (**self).load_all().await
    }
}

/// Errors surfaced by a [`FamilyRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("invalid family record: {0}")]
    ValidationFailure(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("rate limit exceeded for {resource}")]
    RateLimitExceeded { resource: String },

    #[error("circuit open for {resource}")]
    CircuitOpen { resource: String },

    #[error("{resource} is saturated")]
    Saturated { resource: String },

    #[error("{resource} timed out")]
    TimedOut { resource: String },

    #[error("operation cancelled")]
    Cancelled,

    /// Permanent failure, or transient failure that outlived every retry.
    #[error("backend failure after {attempts} attempt(s): {source}")]
    BackendFailure {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl RepositoryError {
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryError::ValidationFailure(_) => "validation_failure",
            RepositoryError::NotFound(_) => "not_found",
            RepositoryError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            RepositoryError::CircuitOpen { .. } => "circuit_open",
            RepositoryError::Saturated { .. } => "saturated",
            RepositoryError::TimedOut { .. } => "timed_out",
            RepositoryError::Cancelled => "cancelled",
            RepositoryError::BackendFailure { .. } => "backend_failure",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

impl From<PipelineError<StoreError>> for RepositoryError {
    fn from(err: PipelineError<StoreError>) -> Self {
        match err {
            PipelineError::RateLimited { resource, .. } => Self::RateLimitExceeded { resource },
            PipelineError::CircuitOpen { resource } => Self::CircuitOpen { resource },
            PipelineError::Saturated { resource, .. } => Self::Saturated { resource },
            PipelineError::TimedOut { resource } => Self::TimedOut { resource },
            PipelineError::Cancelled { .. } => Self::Cancelled,
            PipelineError::Exhausted { attempts, last, .. } => Self::BackendFailure {
                attempts,
                source: last,
            },
            PipelineError::Operation(StoreError::ValidationFailure(msg)) => Self::ValidationFailure(msg),
            PipelineError::Operation(StoreError::NotFound(what)) => Self::NotFound(what),
            PipelineError::Operation(source) => Self::BackendFailure { attempts: 1, source },
        }
    }
}

/// Persistence port for the family aggregate.
///
/// Every call takes a [`CallContext`]; cancelling it stops retries and yields
/// [`RepositoryError::Cancelled`].
#[async_trait]
pub trait FamilyRepository: Send + Sync {
    async fn get_by_id(&self, ctx: &CallContext, id: &FamilyId) -> Result<Family, RepositoryError>;

    async fn save(&self, ctx: &CallContext, family: &Family) -> Result<(), RepositoryError>;

    async fn find_by_parent_id(
        &self,
        ctx: &CallContext,
        parent_id: &PersonId,
    ) -> Result<Vec<Family>, RepositoryError>;

    async fn find_by_child_id(
        &self,
        ctx: &CallContext,
        child_id: &PersonId,
    ) -> Result<Family, RepositoryError>;

    async fn get_all(&self, ctx: &CallContext) -> Result<Vec<Family>, RepositoryError>;
}

#[async_trait]
impl<R> FamilyRepository for Arc<R>
where
    R: FamilyRepository + ?Sized,
{
    async fn get_by_id(&self, ctx: &CallContext, id: &FamilyId) -> Result<Family, RepositoryError> {
        (**self).get_by_id(ctx, id).await
    }

    async fn save(&self, ctx: &CallContext, family: &Family) -> Result<(), RepositoryError> {
        (**self).save(ctx, family).await
    }

    async fn find_by_parent_id(
        &self,
        ctx: &CallContext,
        parent_id: &PersonId,
    ) -> Result<Vec<Family>, RepositoryError> {
        (**self).find_by_parent_id(ctx, parent_id).await
    }

    async fn find_by_child_id(
        &self,
        ctx: &CallContext,
        child_id: &PersonId,
    ) -> Result<Family, RepositoryError> {
        (**self).find_by_child_id(ctx, child_id).await
    }

    async fn get_all(&self, ctx: &CallContext) -> Result<Vec<Family>, RepositoryError> {
        (**self).get_all(ctx).await
    }
}
