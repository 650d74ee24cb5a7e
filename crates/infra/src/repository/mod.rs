//! Family persistence: the repository port, storage backends and the guarded
//! repository that puts the resilience pipeline in front of a backend.

mod guarded;
mod in_memory;
mod record;
mod r#trait;

#[cfg(feature = "postgres")]
mod postgres;

pub use guarded::GuardedFamilyRepository;
pub use in_memory::InMemoryFamilyStore;
pub use record::FamilyRecord;
pub use r#trait::{FamilyRepository, FamilyStore, RepositoryError, StoreError};

#[cfg(feature = "postgres")]
pub use postgres::PostgresFamilyStore;
