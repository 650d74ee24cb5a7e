//! Family application service: load, mutate through the aggregate, save.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use kinship_core::{AggregateRoot, FamilyId, PersonId};
use kinship_family::{Child, Family, FamilyError, FamilyStatus, Parent};
use kinship_infra::{
    CallContext, FamilyRepository, GuardedFamilyRepository, InMemoryFamilyStore, PipelineConfig,
    StorageConfig, StoreError,
};

use crate::app::errors::AppError;

/// Attributes of a person as supplied by a caller. A missing id is generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonInput {
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub death_date: Option<NaiveDate>,
}

impl PersonInput {
    fn resolved_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| PersonId::new().to_string())
    }

    pub fn to_parent(&self) -> Result<Parent, AppError> {
        let parent = Parent::try_new(&self.resolved_id(), &self.first_name, &self.last_name, self.birth_date)?;
        Ok(match self.death_date {
            Some(date) => parent.with_death_date(date)?,
            None => parent,
        })
    }

    pub fn to_child(&self) -> Result<Child, AppError> {
        let child = Child::try_new(&self.resolved_id(), &self.first_name, &self.last_name, self.birth_date)?;
        Ok(match self.death_date {
            Some(date) => child.with_death_date(date)?,
            None => child,
        })
    }
}

/// Both families produced by a divorce, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivorceOutcome {
    pub family: Family,
    pub non_custodial_family: Family,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("persistent storage requested but this build has no postgres support")]
    PostgresUnavailable,
}

/// Build the service for the configured backend.
pub async fn build_service(
    storage: StorageConfig,
    pipeline: PipelineConfig,
) -> Result<FamilyService, StartupError> {
    match storage {
        StorageConfig::InMemory => {
            info!(backend = "in_memory", "family storage ready");
            Ok(FamilyService::in_memory(pipeline))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres { database_url } => {
            let store = kinship_infra::PostgresFamilyStore::connect(&database_url).await?;
            info!(backend = "postgres", "family storage ready");
            Ok(FamilyService::new(Arc::new(GuardedFamilyRepository::new(store, pipeline))))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(StartupError::PostgresUnavailable),
    }
}

/// Application service over the family repository.
///
/// Every mutation follows the same shape: load, apply one aggregate
/// operation, save. A failed operation is never saved.
#[derive(Clone)]
pub struct FamilyService {
    repo: Arc<dyn FamilyRepository>,
}

impl std::fmt::Debug for FamilyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FamilyService").finish_non_exhaustive()
    }
}

impl FamilyService {
    pub fn new(repo: Arc<dyn FamilyRepository>) -> Self {
        Self { repo }
    }

    pub fn in_memory(pipeline: PipelineConfig) -> Self {
        Self::new(Arc::new(GuardedFamilyRepository::new(
            InMemoryFamilyStore::new(),
            pipeline,
        )))
    }

    /// Create and persist a family. Without an explicit status, one parent
    /// means single, two living parents married, otherwise widowed.
    pub async fn create_family(
        &self,
        ctx: &CallContext,
        status: Option<FamilyStatus>,
        parents: &[PersonInput],
        children: &[PersonInput],
    ) -> Result<Family, AppError> {
        let parents = parents
            .iter()
            .map(PersonInput::to_parent)
            .collect::<Result<Vec<_>, _>>()?;
        let children = children
            .iter()
            .map(PersonInput::to_child)
            .collect::<Result<Vec<_>, _>>()?;

        let status = status.unwrap_or_else(|| default_status(&parents));
        let family = Family::create(FamilyId::new(), status, parents, children)?;
        self.repo.save(ctx, &family).await?;

        info!(family_id = %family.id(), status = %family.status(), "family created");
        Ok(family)
    }

    pub async fn get_family(&self, ctx: &CallContext, id: &str) -> Result<Family, AppError> {
        Ok(self.repo.get_by_id(ctx, &FamilyId::parse(id)?).await?)
    }

    pub async fn list_families(&self, ctx: &CallContext) -> Result<Vec<Family>, AppError> {
        Ok(self.repo.get_all(ctx).await?)
    }

    pub async fn find_families_by_parent(
        &self,
        ctx: &CallContext,
        parent_id: &str,
    ) -> Result<Vec<Family>, AppError> {
        Ok(self.repo.find_by_parent_id(ctx, &PersonId::parse(parent_id)?).await?)
    }

    pub async fn find_family_by_child(&self, ctx: &CallContext, child_id: &str) -> Result<Family, AppError> {
        Ok(self.repo.find_by_child_id(ctx, &PersonId::parse(child_id)?).await?)
    }

    pub async fn add_parent(
        &self,
        ctx: &CallContext,
        family_id: &str,
        parent: &PersonInput,
    ) -> Result<Family, AppError> {
        let parent = parent.to_parent()?;
        let (family, ()) = self
            .mutate(ctx, family_id, "add_parent", |f| f.add_parent(parent))
            .await?;
        Ok(family)
    }

    pub async fn add_child(
        &self,
        ctx: &CallContext,
        family_id: &str,
        child: &PersonInput,
    ) -> Result<Family, AppError> {
        let child = child.to_child()?;
        let (family, ()) = self
            .mutate(ctx, family_id, "add_child", |f| f.add_child(child))
            .await?;
        Ok(family)
    }

    pub async fn remove_child(
        &self,
        ctx: &CallContext,
        family_id: &str,
        child_id: &str,
    ) -> Result<Family, AppError> {
        let child_id = PersonId::parse(child_id)?;
        let (family, _removed) = self
            .mutate(ctx, family_id, "remove_child", |f| f.remove_child(&child_id))
            .await?;
        Ok(family)
    }

    pub async fn mark_parent_deceased(
        &self,
        ctx: &CallContext,
        family_id: &str,
        parent_id: &str,
        death_date: NaiveDate,
    ) -> Result<Family, AppError> {
        let parent_id = PersonId::parse(parent_id)?;
        let (family, ()) = self
            .mutate(ctx, family_id, "mark_parent_deceased", |f| {
                f.mark_parent_deceased(&parent_id, death_date)
            })
            .await?;
        Ok(family)
    }

    /// Divorce and persist both resulting families.
    ///
    /// The non-custodial family is written first under an id derived from
    /// the pre-divorce state. If the second write fails the original family
    /// is still married at the same version, so repeating the request
    /// overwrites the same non-custodial record and completes the divorce.
    pub async fn divorce(
        &self,
        ctx: &CallContext,
        family_id: &str,
        custodial_parent_id: &str,
    ) -> Result<DivorceOutcome, AppError> {
        let custodial_parent_id = PersonId::parse(custodial_parent_id)?;
        let mut family = self.repo.get_by_id(ctx, &FamilyId::parse(family_id)?).await?;

        let settlement = family.divorce(&custodial_parent_id)?;
        let non_custodial_family = settlement.non_custodial_family()?;

        self.repo.save(ctx, &non_custodial_family).await?;
        if let Err(err) = self.repo.save(ctx, &family).await {
            warn!(
                family_id = %family.id(),
                non_custodial_family_id = %non_custodial_family.id(),
                error = %err,
                "divorce partially persisted; repeat the request to complete it"
            );
            return Err(err.into());
        }

        info!(
            family_id = %family.id(),
            non_custodial_family_id = %non_custodial_family.id(),
            custodial_parent_id = %custodial_parent_id,
            "divorce recorded"
        );
        Ok(DivorceOutcome {
            family,
            non_custodial_family,
        })
    }

    async fn mutate<T>(
        &self,
        ctx: &CallContext,
        family_id: &str,
        operation: &'static str,
        op: impl FnOnce(&mut Family) -> Result<T, FamilyError>,
    ) -> Result<(Family, T), AppError> {
        let mut family = self.repo.get_by_id(ctx, &FamilyId::parse(family_id)?).await?;
        let outcome = op(&mut family)?;
        self.repo.save(ctx, &family).await?;

        info!(
            family_id = %family.id(),
            operation,
            status = %family.status(),
            version = family.version(),
            "family updated"
        );
        Ok((family, outcome))
    }
}

fn default_status(parents: &[Parent]) -> FamilyStatus {
    match parents.len() {
        2 if parents.iter().all(|p| !p.is_deceased()) => FamilyStatus::Married,
        2 => FamilyStatus::Widowed,
        _ => FamilyStatus::Single,
    }
}
