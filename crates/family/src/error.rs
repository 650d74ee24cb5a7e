//! Family aggregate errors.
//!
//! Every variant is a deterministic validation failure: retrying the same
//! operation against the same state fails the same way.

use thiserror::Error;

use kinship_core::{DomainError, FamilyId, PersonId};

use crate::family::FamilyStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FamilyError {
    /// The family as a whole is not a valid structure (bad parent count,
    /// duplicates, inconsistent status, invalid person).
    #[error("invalid family structure: {0}")]
    Structure(String),

    #[error("family {family_id} already has two parents")]
    TooManyParents { family_id: FamilyId },

    #[error("parent {parent_id} already belongs to this family")]
    ParentExists { parent_id: PersonId },

    #[error("child {child_id} already belongs to this family")]
    ChildExists { child_id: PersonId },

    #[error("parent {parent_id} not found in family")]
    ParentNotFound { parent_id: PersonId },

    #[error("child {child_id} not found in family")]
    ChildNotFound { child_id: PersonId },

    /// The parent cannot take a death date: either one is already recorded
    /// or the requested date precedes their birth.
    #[error("parent {parent_id} cannot be marked deceased: {reason}")]
    AlreadyDeceased { parent_id: PersonId, reason: String },

    #[error("family is {status}, only a married family can divorce")]
    NotMarried { status: FamilyStatus },

    #[error("divorce requires exactly two parents, family has {count}")]
    RequiresTwoParents { count: usize },

    /// A value supplied to the aggregate failed its own validation.
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl FamilyError {
    pub fn structure(msg: impl Into<String>) -> Self {
        Self::Structure(msg.into())
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            FamilyError::Structure(_) => "structure",
            FamilyError::TooManyParents { .. } => "too_many_parents",
            FamilyError::ParentExists { .. } => "parent_exists",
            FamilyError::ChildExists { .. } => "child_exists",
            FamilyError::ParentNotFound { .. } => "parent_not_found",
            FamilyError::ChildNotFound { .. } => "child_not_found",
            FamilyError::AlreadyDeceased { .. } => "already_deceased",
            FamilyError::NotMarried { .. } => "not_married",
            FamilyError::RequiresTwoParents { .. } => "requires_two_parents",
            FamilyError::Invalid(e) => e.kind(),
        }
    }

    /// Whether the failure is about a member that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FamilyError::ParentNotFound { .. } | FamilyError::ChildNotFound { .. }
        )
    }
}
