//! Infrastructure layer: resilience pipeline, family persistence, config.

pub mod config;
pub mod repository;
pub mod resilience;

pub use config::{ConfigError, StorageConfig};
pub use repository::{
    FamilyRecord, FamilyRepository, FamilyStore, GuardedFamilyRepository, InMemoryFamilyStore,
    RepositoryError, StoreError,
};
pub use resilience::{CallContext, PipelineConfig, PipelineError, ResiliencePipeline};

#[cfg(feature = "postgres")]
pub use repository::PostgresFamilyStore;
