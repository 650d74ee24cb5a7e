//! Domain foundation building blocks.
//!
//! Identity and temporal value types plus the small trait vocabulary shared by
//! the family domain. Nothing here performs IO.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod temporal;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{FamilyId, PersonId};
pub use temporal::{BirthDate, DeathDate};
pub use value_object::{Name, ValueObject};
