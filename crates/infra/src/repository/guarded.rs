use async_trait::async_trait;
use tracing::instrument;

use kinship_core::{AggregateRoot, FamilyId, PersonId};
use kinship_family::Family;

use crate::resilience::{CallContext, PipelineConfig, ResiliencePipeline};

use super::r#trait::{FamilyRepository, FamilyStore, RepositoryError};

/// [`FamilyRepository`] that runs every store call through a
/// [`ResiliencePipeline`].
#[derive(Debug)]
pub struct GuardedFamilyRepository<S> {
    store: S,
    pipeline: ResiliencePipeline,
}

impl<S: FamilyStore> GuardedFamilyRepository<S> {
    pub fn new(store: S, config: PipelineConfig) -> Self {
        let pipeline = ResiliencePipeline::new(format!("family_store.{}", store.backend()), config);
        Self { store, pipeline }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pipeline(&self) -> &ResiliencePipeline {
        &self.pipeline
    }
}

#[async_trait]
impl<S: FamilyStore> FamilyRepository for GuardedFamilyRepository<S> {
    #[instrument(skip(self, ctx), fields(family_id = %id))]
    async fn get_by_id(&self, ctx: &CallContext, id: &FamilyId) -> Result<Family, RepositoryError> {
        Ok(self.pipeline.execute(ctx, || self.store.load(id)).await?)
    }

    #[instrument(skip_all, fields(family_id = %family.id(), version = family.version()))]
    async fn save(&self, ctx: &CallContext, family: &Family) -> Result<(), RepositoryError> {
        Ok(self.pipeline.execute(ctx, || self.store.store(family)).await?)
    }

    #[instrument(skip(self, ctx), fields(parent_id = %parent_id))]
    async fn find_by_parent_id(
        &self,
        ctx: &CallContext,
        parent_id: &PersonId,
    ) -> Result<Vec<Family>, RepositoryError> {
        Ok(self
            .pipeline
            .execute(ctx, || self.store.load_by_parent(parent_id))
            .await?)
    }

    #[instrument(skip(self, ctx), fields(child_id = %child_id))]
    async fn find_by_child_id(
        &self,
        ctx: &CallContext,
        child_id: &PersonId,
    ) -> Result<Family, RepositoryError> {
        Ok(self
            .pipeline
            .execute(ctx, || self.store.load_by_child(child_id))
            .await?)
    }

    #[instrument(skip_all)]
    async fn get_all(&self, ctx: &CallContext) -> Result<Vec<Family>, RepositoryError> {
        Ok(self.pipeline.execute(ctx, || self.store.load_all()).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;

    use kinship_family::{FamilyStatus, Parent};

    use super::*;
    use crate::repository::{InMemoryFamilyStore, StoreError};
    use crate::resilience::{CircuitBreakerConfig, CircuitState, RateLimiterConfig, RetryPolicy};

    /// Wraps the in-memory store and fails the first `failures` calls.
    struct FlakyStore {
        inner: InMemoryFamilyStore,
        failures: AtomicU32,
        error: StoreError,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32, error: StoreError) -> Self {
            Self {
                inner: InMemoryFamilyStore::new(),
                failures: AtomicU32::new(failures),
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(self.error.clone());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl FamilyStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn load(&self, id: &FamilyId) -> Result<Family, StoreError> {
            self.trip()?;
            self.inner.load(id).await
        }

        async fn store(&self, family: &Family) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.store(family).await
        }

        async fn load_by_parent(&self, parent_id: &PersonId) -> Result<Vec<Family>, StoreError> {
            self.trip()?;
            self.inner.load_by_parent(parent_id).await
        }

        async fn load_by_child(&self, child_id: &PersonId) -> Result<Family, StoreError> {
            self.trip()?;
            self.inner.load_by_child(child_id).await
        }

        async fn load_all(&self) -> Result<Vec<Family>, StoreError> {
            self.trip()?;
            self.inner.load_all().await
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            retry: RetryPolicy::exponential(3, Duration::from_millis(10), Duration::from_millis(100)),
            circuit: CircuitBreakerConfig {
                timeout: Duration::from_secs(2),
                max_concurrent: 16,
                error_threshold: 50.0,
                volume_threshold: 2,
                sleep_window: Duration::from_secs(10),
                rolling_window: Duration::from_secs(60),
            },
            rate: RateLimiterConfig::default(),
        }
    }

    fn family() -> Family {
        Family::create(
            FamilyId::parse("F1").unwrap(),
            FamilyStatus::Single,
            vec![Parent::try_new("P1", "Ada", "King", NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()).unwrap()],
            Vec::new(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_absorbed_by_retry() {
        let repo = GuardedFamilyRepository::new(
            Arc::new(FlakyStore::new(2, StoreError::Transient("connection reset".into()))),
            config(),
        );
        let ctx = CallContext::new();

        repo.save(&ctx, &family()).await.unwrap();
        assert_eq!(repo.store().calls.load(Ordering::SeqCst), 3);
        assert_eq!(repo.get_by_id(&ctx, family().id()).await.unwrap(), family());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_as_backend_failure() {
        let repo = GuardedFamilyRepository::new(
            FlakyStore::new(10, StoreError::Transient("failover".into())),
            config(),
        );

        match repo.save(&CallContext::new(), &family()).await {
            Err(RepositoryError::BackendFailure { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source, StoreError::Transient("failover".into()));
            }
            other => panic!("expected backend failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_neither_retried_nor_a_breaker_failure() {
        let repo = GuardedFamilyRepository::new(FlakyStore::new(0, StoreError::Permanent(String::new())), config());
        let ctx = CallContext::new();
        let missing = FamilyId::parse("nope").unwrap();

        for _ in 0..5 {
            assert!(repo.get_by_id(&ctx, &missing).await.unwrap_err().is_not_found());
        }
        assert_eq!(repo.store().calls.load(Ordering::SeqCst), 5);
        assert_eq!(repo.pipeline().circuit_state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_open_the_circuit() {
        let repo = GuardedFamilyRepository::new(
            FlakyStore::new(2, StoreError::Permanent("disk full".into())),
            config(),
        );
        let ctx = CallContext::new();

        for _ in 0..2 {
            assert!(matches!(
                repo.save(&ctx, &family()).await,
                Err(RepositoryError::BackendFailure { attempts: 1, .. })
            ));
        }
        assert!(matches!(
            repo.get_all(&ctx).await,
            Err(RepositoryError::CircuitOpen { .. })
        ));
        assert_eq!(repo.store().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_context_is_reported_as_cancelled() {
        let repo = GuardedFamilyRepository::new(InMemoryFamilyStore::new(), config());
        let ctx = CallContext::new();
        ctx.cancel();

        assert!(matches!(repo.get_all(&ctx).await, Err(RepositoryError::Cancelled)));
    }
}
