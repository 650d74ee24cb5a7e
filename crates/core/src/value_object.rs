//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attributes. To "change"
/// one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A person's first or last name. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    /// Trims surrounding whitespace and rejects empty input.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Name {}

impl core::fmt::Display for Name {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Name {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(value: Name) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed() {
        assert_eq!(Name::new("  Ada ").unwrap().as_str(), "Ada");
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(matches!(Name::new(" \t"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn names_compare_by_value() {
        assert_eq!(Name::new("Ada").unwrap(), Name::new("Ada ").unwrap());
    }
}
