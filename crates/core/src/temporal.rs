//! Birth and death dates.
//!
//! Both are plain calendar dates (no time zone). "Today" is taken from the UTC
//! clock unless a caller supplies a reference date, which tests do.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Date of birth. Never in the future relative to the date it was validated on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BirthDate(NaiveDate);

/// Date of death. Only meaningful next to the birth date it must not precede.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeathDate(NaiveDate);

/// Current calendar date (UTC).
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

impl BirthDate {
    pub fn new(date: NaiveDate) -> Result<Self, DomainError> {
        Self::new_as_of(date, today())
    }

    /// Validate against an explicit reference date.
    pub fn new_as_of(date: NaiveDate, today: NaiveDate) -> Result<Self, DomainError> {
        if date > today {
            return Err(DomainError::validation(format!(
                "birth date {date} is in the future"
            )));
        }
        Ok(Self(date))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Re-check the "not in the future" rule, e.g. for rehydrated state.
    pub fn ensure_not_future(&self, today: NaiveDate) -> Result<(), DomainError> {
        Self::new_as_of(self.0, today).map(|_| ())
    }
}

impl DeathDate {
    /// A death date is validated against the birth date of the person it
    /// belongs to.
    pub fn new(date: NaiveDate, birth: BirthDate) -> Result<Self, DomainError> {
        if date < birth.0 {
            return Err(DomainError::validation(format!(
                "death date {date} precedes birth date {}",
                birth.0
            )));
        }
        Ok(Self(date))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl ValueObject for BirthDate {}
impl ValueObject for DeathDate {}

impl core::fmt::Display for BirthDate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::fmt::Display for DeathDate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
