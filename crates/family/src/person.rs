//! Person entities: parents and children.
//!
//! Both carry the same attributes and the same person invariants; they are
//! separate types so a child can never be passed where a parent is expected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kinship_core::{BirthDate, DeathDate, DomainError, DomainResult, Entity, Name, PersonId};

macro_rules! person_entity {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $t {
            id: PersonId,
            first_name: Name,
            last_name: Name,
            birth_date: BirthDate,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            death_date: Option<DeathDate>,
        }

        impl $t {
            pub fn new(id: PersonId, first_name: Name, last_name: Name, birth_date: BirthDate) -> Self {
                Self {
                    id,
                    first_name,
                    last_name,
                    birth_date,
                    death_date: None,
                }
            }

            /// Build from raw input, validating every field.
            pub fn try_new(
                id: &str,
                first_name: &str,
                last_name: &str,
                birth_date: NaiveDate,
            ) -> DomainResult<Self> {
                Ok(Self::new(
                    PersonId::parse(id)?,
                    Name::new(first_name)?,
                    Name::new(last_name)?,
                    BirthDate::new(birth_date)?,
                ))
            }

            /// Attach a death date; it must not precede the birth date.
            pub fn with_death_date(mut self, date: NaiveDate) -> DomainResult<Self> {
                self.death_date = Some(DeathDate::new(date, self.birth_date)?);
                Ok(self)
            }

            pub fn first_name(&self) -> &Name {
                &self.first_name
            }

            pub fn last_name(&self) -> &Name {
                &self.last_name
            }

            pub fn birth_date(&self) -> BirthDate {
                self.birth_date
            }

            pub fn death_date(&self) -> Option<DeathDate> {
                self.death_date
            }

            pub fn is_deceased(&self) -> bool {
                self.death_date.is_some()
            }

            /// Person invariants, re-checked for state coming back from storage.
            pub fn check_invariants(&self, today: NaiveDate) -> DomainResult<()> {
                self.birth_date.ensure_not_future(today)?;
                if let Some(death) = self.death_date {
                    if death.date() < self.birth_date.date() {
                        return Err(DomainError::validation(format!(
                            "person {}: death date {death} precedes birth date {}",
                            self.id, self.birth_date
                        )));
                    }
                }
                Ok(())
            }
        }

        impl Entity for $t {
            type Id = PersonId;

            fn id(&self) -> &Self::Id {
                &self.id
            }
        }
    };
}

person_entity!(
    /// A parent within a family.
    Parent
);

person_entity!(
    /// A child within a family.
    Child
);

impl Parent {
    /// Structural duplicate check used alongside identity: same first name,
    /// last name and birth date.
    pub fn same_person_as(&self, other: &Parent) -> bool {
        self.first_name == other.first_name
            && self.last_name == other.last_name
            && self.birth_date == other.birth_date
    }
}
