//! Storage document for a family.

use serde::{Deserialize, Serialize};

use kinship_core::{AggregateRoot, Entity, FamilyId, PersonId};
use kinship_family::{Child, Family, FamilyStatus, Parent};

use super::r#trait::StoreError;

/// Serialized form of a [`Family`], one document per family.
///
/// Loading goes through [`Family::restore`], so a document edited out from
/// under the aggregate is rejected instead of trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRecord {
    pub id: FamilyId,
    pub status: FamilyStatus,
    pub parents: Vec<Parent>,
    #[serde(default)]
    pub children: Vec<Child>,
    #[serde(default)]
    pub version: u64,
}

impl FamilyRecord {
    pub fn from_family(family: &Family) -> Self {
        Self {
            id: family.id().clone(),
            status: family.status(),
            parents: family.parents().to_vec(),
            children: family.children().to_vec(),
            version: family.version(),
        }
    }

    pub fn into_family(self) -> Result<Family, StoreError> {
        let id = self.id.clone();
        Family::restore(self.id, self.status, self.parents, self.children, self.version)
            .map_err(|e| StoreError::ValidationFailure(format!("family {id}: {e}")))
    }

    pub fn has_parent(&self, parent_id: &PersonId) -> bool {
        self.parents.iter().any(|p| p.id() == parent_id)
    }

    pub fn has_child(&self, child_id: &PersonId) -> bool {
        self.children.iter().any(|c| c.id() == child_id)
    }
}
