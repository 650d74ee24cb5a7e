use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kinship_core::temporal::today;
use kinship_core::{AggregateRoot, Entity, FamilyId, PersonId};

use crate::error::FamilyError;
use crate::person::{Child, Parent};

/// Marital status of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyStatus {
    Single,
    Married,
    Divorced,
    Widowed,
}

impl FamilyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyStatus::Single => "single",
            FamilyStatus::Married => "married",
            FamilyStatus::Divorced => "divorced",
            FamilyStatus::Widowed => "widowed",
        }
    }
}

impl core::fmt::Display for FamilyStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: Family.
///
/// Owns one or two parents and any number of children. All mutation goes
/// through the lifecycle operations below, each of which works on a copy,
/// re-validates every invariant and only then replaces `self`. A failed
/// operation leaves the family exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    id: FamilyId,
    status: FamilyStatus,
    parents: Vec<Parent>,
    children: Vec<Child>,
    version: u64,
}

/// Result of a successful divorce.
///
/// The family the divorce was invoked on keeps the custodial parent and the
/// children. The non-custodial parent leaves; persisting their new family is
/// the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivorceSettlement {
    family_id: FamilyId,
    non_custodial: Parent,
    version_at_divorce: u64,
}

impl DivorceSettlement {
    pub fn non_custodial_parent(&self) -> &Parent {
        &self.non_custodial
    }

    /// Identifier for the non-custodial family.
    ///
    /// Derived from the divorced family, the departing parent and the
    /// pre-divorce version, so re-running the same divorce after a partial
    /// write targets the same record instead of minting a duplicate.
    pub fn non_custodial_family_id(&self) -> Result<FamilyId, FamilyError> {
        Ok(FamilyId::parse(format!(
            "{}-{}-v{}",
            self.family_id,
            self.non_custodial.id(),
            self.version_at_divorce
        ))?)
    }

    /// The new single-parent family for the non-custodial parent.
    pub fn non_custodial_family(&self) -> Result<Family, FamilyError> {
        Family::create(
            self.non_custodial_family_id()?,
            FamilyStatus::Divorced,
            vec![self.non_custodial.clone()],
            Vec::new(),
        )
    }
}

impl Family {
    /// Create a new family, validating the complete structure.
    pub fn create(
        id: FamilyId,
        status: FamilyStatus,
        parents: Vec<Parent>,
        children: Vec<Child>,
    ) -> Result<Self, FamilyError> {
        Self::restore(id, status, parents, children, 0)
    }

    /// Rehydrate a family loaded from storage. Applies the same checks as
    /// `create`; corrupt records are rejected rather than trusted.
    pub fn restore(
        id: FamilyId,
        status: FamilyStatus,
        parents: Vec<Parent>,
        children: Vec<Child>,
        version: u64,
    ) -> Result<Self, FamilyError> {
        let family = Self {
            id,
            status,
            parents,
            children,
            version,
        };
        family.check_invariants()?;
        Ok(family)
    }

    pub fn status(&self) -> FamilyStatus {
        self.status
    }

    pub fn parents(&self) -> &[Parent] {
        &self.parents
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn parent(&self, parent_id: &PersonId) -> Option<&Parent> {
        self.parents.iter().find(|p| p.id() == parent_id)
    }

    pub fn child(&self, child_id: &PersonId) -> Option<&Child> {
        self.children.iter().find(|c| c.id() == child_id)
    }

    pub fn has_child(&self, child_id: &PersonId) -> bool {
        self.child(child_id).is_some()
    }

    pub fn living_parent_count(&self) -> usize {
        self.parents.iter().filter(|p| !p.is_deceased()).count()
    }

    /// Add a parent (marriage or remarriage).
    ///
    /// Reaching two parents makes the family Married, or Widowed if one of
    /// the two is already deceased.
    pub fn add_parent(&mut self, parent: Parent) -> Result<(), FamilyError> {
        self.commit(|family| {
            if family.parents.len() >= 2 {
                return Err(FamilyError::TooManyParents {
                    family_id: family.id.clone(),
                });
            }
            if family
                .parents
                .iter()
                .any(|p| p.same_identity_as(&parent) || p.same_person_as(&parent))
            {
                return Err(FamilyError::ParentExists {
                    parent_id: parent.id().clone(),
                });
            }

            family.parents.push(parent);
            if family.parents.len() == 2 {
                family.status = if family.living_parent_count() == 2 {
                    FamilyStatus::Married
                } else {
                    FamilyStatus::Widowed
                };
            }
            Ok(())
        })
    }

    pub fn add_child(&mut self, child: Child) -> Result<(), FamilyError> {
        self.commit(|family| {
            if family.has_child(child.id()) {
                return Err(FamilyError::ChildExists {
                    child_id: child.id().clone(),
                });
            }
            family.children.push(child);
            Ok(())
        })
    }

    /// Remove a child, returning it. Status is unaffected.
    pub fn remove_child(&mut self, child_id: &PersonId) -> Result<Child, FamilyError> {
        self.commit(|family| {
            let idx = family
                .children
                .iter()
                .position(|c| c.id() == child_id)
                .ok_or_else(|| FamilyError::ChildNotFound {
                    child_id: child_id.clone(),
                })?;
            Ok(family.children.remove(idx))
        })
    }

    /// Record a parent's death. A married family left with one living parent
    /// becomes Widowed.
    pub fn mark_parent_deceased(
        &mut self,
        parent_id: &PersonId,
        death_date: NaiveDate,
    ) -> Result<(), FamilyError> {
        self.commit(|family| {
            let idx = family.parent_index(parent_id)?;
            let parent = &family.parents[idx];

            if parent.is_deceased() {
                return Err(FamilyError::AlreadyDeceased {
                    parent_id: parent_id.clone(),
                    reason: "a death date is already recorded".to_string(),
                });
            }
            let birth_date = parent.birth_date().date();
            if death_date < birth_date {
                return Err(FamilyError::AlreadyDeceased {
                    parent_id: parent_id.clone(),
                    reason: format!("death date {death_date} precedes birth date {birth_date}"),
                });
            }

            let deceased = parent.clone().with_death_date(death_date)?;
            family.parents[idx] = deceased;
            if family.status == FamilyStatus::Married && family.living_parent_count() < 2 {
                family.status = FamilyStatus::Widowed;
            }
            Ok(())
        })
    }

    /// Divorce. `self` becomes the custodial family; the returned settlement
    /// carries the departing parent.
    pub fn divorce(
        &mut self,
        custodial_parent_id: &PersonId,
    ) -> Result<DivorceSettlement, FamilyError> {
        self.commit(|family| {
            if family.status != FamilyStatus::Married {
                return Err(FamilyError::NotMarried {
                    status: family.status,
                });
            }
            if family.parents.len() != 2 {
                return Err(FamilyError::RequiresTwoParents {
                    count: family.parents.len(),
                });
            }
            let custodial_idx = family.parent_index(custodial_parent_id)?;
            let non_custodial = family.parents.remove(1 - custodial_idx);
            family.status = FamilyStatus::Divorced;

            Ok(DivorceSettlement {
                family_id: family.id.clone(),
                non_custodial,
                version_at_divorce: family.version,
            })
        })
    }

    fn parent_index(&self, parent_id: &PersonId) -> Result<usize, FamilyError> {
        self.parents
            .iter()
            .position(|p| p.id() == parent_id)
            .ok_or_else(|| FamilyError::ParentNotFound {
                parent_id: parent_id.clone(),
            })
    }

    /// Copy, mutate, validate, then swap in.
    fn commit<T>(
        &mut self,
        op: impl FnOnce(&mut Family) -> Result<T, FamilyError>,
    ) -> Result<T, FamilyError> {
        let mut draft = self.clone();
        let outcome = op(&mut draft)?;
        draft.check_invariants()?;
        draft.version += 1;
        *self = draft;
        Ok(outcome)
    }

    fn check_status(&self) -> Result<(), FamilyError> {
        let count = self.parents.len();
        let living = self.living_parent_count();

        let consistent = match self.status {
            FamilyStatus::Single => count == 1,
            FamilyStatus::Married => count == 2 && living == 2,
            FamilyStatus::Divorced => count == 1,
            FamilyStatus::Widowed => living <= 1,
        };
        if !consistent {
            return Err(FamilyError::structure(format!(
                "status {} is inconsistent with {count} parent(s), {living} living",
                self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Family {
    type Id = FamilyId;
    type Error = FamilyError;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn check_invariants(&self) -> Result<(), Self::Error> {
        let today = today();

        let count = self.parents.len();
        if !(1..=2).contains(&count) {
            return Err(FamilyError::structure(format!(
                "a family has one or two parents, found {count}"
            )));
        }

        for (i, parent) in self.parents.iter().enumerate() {
            parent
                .check_invariants(today)
                .map_err(|e| FamilyError::structure(format!("parent {}: {e}", parent.id())))?;
            for other in &self.parents[i + 1..] {
                if parent.same_identity_as(other) {
                    return Err(FamilyError::structure(format!(
                        "duplicate parent id {}",
                        parent.id()
                    )));
                }
                if parent.same_person_as(other) {
                    return Err(FamilyError::structure(format!(
                        "duplicate parent {} {} born {}",
                        parent.first_name(),
                        parent.last_name(),
                        parent.birth_date()
                    )));
                }
            }
        }

        let mut seen = HashSet::with_capacity(self.children.len());
        for child in &self.children {
            child
                .check_invariants(today)
                .map_err(|e| FamilyError::structure(format!("child {}: {e}", child.id())))?;
            if !seen.insert(child.id()) {
                return Err(FamilyError::structure(format!(
                    "duplicate child id {}",
                    child.id()
                )));
            }
        }

        self.check_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pid(s: &str) -> PersonId {
        PersonId::parse(s).unwrap()
    }

    fn fid(s: &str) -> FamilyId {
        FamilyId::parse(s).unwrap()
    }

    fn parent(id: &str, first: &str, year: i32) -> Parent {
        Parent::try_new(id, first, "Doe", date(year, 3, 14)).unwrap()
    }

    fn child(id: &str, first: &str, year: i32) -> Child {
        Child::try_new(id, first, "Doe", date(year, 7, 1)).unwrap()
    }

    fn married_f1() -> Family {
        Family::create(
            fid("F1"),
            FamilyStatus::Married,
            vec![parent("P1", "Jane", 1980), parent("P2", "John", 1979)],
            vec![child("C1", "Ann", 2010), child("C2", "Bob", 2012)],
        )
        .unwrap()
    }

    fn single_f2() -> Family {
        Family::create(
            fid("F2"),
            FamilyStatus::Single,
            vec![parent("P1", "Jane", 1980)],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn create_rejects_zero_or_three_parents() {
        let none = Family::create(fid("F"), FamilyStatus::Single, vec![], vec![]);
        assert!(matches!(none, Err(FamilyError::Structure(_))));

        let three = Family::create(
            fid("F"),
            FamilyStatus::Married,
            vec![parent("P1", "A", 1980), parent("P2", "B", 1981), parent("P3", "C", 1982)],
            vec![],
        );
        assert!(matches!(three, Err(FamilyError::Structure(_))));
    }

    #[test]
    fn create_rejects_structural_duplicate_parent() {
        let result = Family::create(
            fid("F"),
            FamilyStatus::Married,
            vec![parent("P1", "Jane", 1980), parent("P2", "Jane", 1980)],
            vec![],
        );
        assert!(matches!(result, Err(FamilyError::Structure(msg)) if msg.contains("duplicate parent")));
    }

    #[test]
    fn create_rejects_duplicate_child_ids() {
        let result = Family::create(
            fid("F"),
            FamilyStatus::Single,
            vec![parent("P1", "Jane", 1980)],
            vec![child("C1", "Ann", 2010), child("C1", "Bob", 2012)],
        );
        assert!(matches!(result, Err(FamilyError::Structure(_))));
    }

    #[test]
    fn create_rejects_inconsistent_status() {
        let married_single_parent = Family::create(
            fid("F"),
            FamilyStatus::Married,
            vec![parent("P1", "Jane", 1980)],
            vec![],
        );
        assert!(matches!(married_single_parent, Err(FamilyError::Structure(_))));

        let single_two_parents = Family::create(
            fid("F"),
            FamilyStatus::Single,
            vec![parent("P1", "Jane", 1980), parent("P2", "John", 1979)],
            vec![],
        );
        assert!(matches!(single_two_parents, Err(FamilyError::Structure(_))));
    }

    #[test]
    fn add_parent_to_single_family_marries() {
        let mut family = single_f2();
        family.add_parent(parent("P2", "John", 1979)).unwrap();
        assert_eq!(family.status(), FamilyStatus::Married);
        assert_eq!(family.parents().len(), 2);
        assert_eq!(family.version(), 1);
    }

    #[test]
    fn add_parent_to_two_parent_family_fails_and_leaves_state() {
        let mut family = married_f1();
        let before = family.clone();
        let err = family.add_parent(parent("P3", "Jim", 1985)).unwrap_err();
        assert!(matches!(err, FamilyError::TooManyParents { .. }));
        assert_eq!(family, before);
    }

    #[test]
    fn add_parent_rejects_identity_and_structural_duplicates() {
        let mut family = single_f2();
        let same_id = Parent::try_new("P1", "Other", "Name", date(1990, 1, 1)).unwrap();
        assert!(matches!(
            family.add_parent(same_id),
            Err(FamilyError::ParentExists { .. })
        ));
        assert!(matches!(
            family.add_parent(parent("P9", "Jane", 1980)),
            Err(FamilyError::ParentExists { .. })
        ));
        assert_eq!(family.status(), FamilyStatus::Single);
    }

    #[test]
    fn remarriage_after_divorce() {
        let mut family = married_f1();
        family.divorce(&pid("P1")).unwrap();
        family.add_parent(parent("P3", "Jim", 1985)).unwrap();
        assert_eq!(family.status(), FamilyStatus::Married);
        assert_eq!(family.children().len(), 2);
    }

    #[test]
    fn add_and_remove_children() {
        let mut family = single_f2();
        family.add_child(child("C1", "Ann", 2010)).unwrap();
        assert!(matches!(
            family.add_child(child("C1", "Other", 2011)),
            Err(FamilyError::ChildExists { .. })
        ));

        let removed = family.remove_child(&pid("C1")).unwrap();
        assert_eq!(removed.id(), &pid("C1"));
        assert!(family.children().is_empty());
        assert_eq!(family.status(), FamilyStatus::Single);

        assert!(matches!(
            family.remove_child(&pid("C1")),
            Err(FamilyError::ChildNotFound { .. })
        ));
    }

    #[test]
    fn death_of_a_married_parent_widows_the_family() {
        let mut family = married_f1();
        family.mark_parent_deceased(&pid("P2"), date(2020, 5, 5)).unwrap();
        assert_eq!(family.status(), FamilyStatus::Widowed);
        assert!(family.parent(&pid("P2")).unwrap().is_deceased());
        assert_eq!(family.living_parent_count(), 1);
    }

    #[test]
    fn marking_deceased_twice_fails() {
        let mut family = married_f1();
        family.mark_parent_deceased(&pid("P2"), date(2020, 5, 5)).unwrap();
        let before = family.clone();
        let err = family
            .mark_parent_deceased(&pid("P2"), date(2021, 5, 5))
            .unwrap_err();
        assert!(matches!(err, FamilyError::AlreadyDeceased { .. }));
        assert_eq!(family, before);
    }

    #[test]
    fn death_before_birth_is_rejected() {
        let mut family = married_f1();
        let err = family
            .mark_parent_deceased(&pid("P1"), date(1970, 1, 1))
            .unwrap_err();
        assert_eq!(err.kind(), "already_deceased");
        assert!(err.to_string().contains("precedes birth date"));
        assert_eq!(family.status(), FamilyStatus::Married);
        assert!(!family.parent(&pid("P1")).unwrap().is_deceased());
    }

    #[test]
    fn second_parent_joining_a_bereaved_single_family_widows_it() {
        let mut family = single_f2();
        family.mark_parent_deceased(&pid("P1"), date(2020, 5, 5)).unwrap();
        assert_eq!(family.status(), FamilyStatus::Single);

        family.add_parent(parent("P2", "John", 1979)).unwrap();
        assert_eq!(family.status(), FamilyStatus::Widowed);
        assert_eq!(family.parents().len(), 2);
        assert_eq!(family.living_parent_count(), 1);
        assert!(family.check_invariants().is_ok());
    }

    #[test]
    fn unknown_parent_cannot_be_marked_deceased() {
        let mut family = married_f1();
        assert!(matches!(
            family.mark_parent_deceased(&pid("P9"), date(2020, 1, 1)),
            Err(FamilyError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn divorce_married_family_keeps_custodial_parent_and_children() {
        let mut family = married_f1();
        let settlement = family.divorce(&pid("P1")).unwrap();

        assert_eq!(family.status(), FamilyStatus::Divorced);
        assert_eq!(family.parents().len(), 1);
        assert_eq!(family.parents()[0].id(), &pid("P1"));
        assert_eq!(family.children().len(), 2);

        assert_eq!(settlement.non_custodial_parent().id(), &pid("P2"));
        let other = settlement.non_custodial_family().unwrap();
        assert_eq!(other.status(), FamilyStatus::Divorced);
        assert_eq!(other.parents()[0].id(), &pid("P2"));
        assert!(other.children().is_empty());
        assert_ne!(other.id(), family.id());
    }

    #[test]
    fn divorce_single_family_fails_not_married() {
        let mut family = single_f2();
        let before = family.clone();
        let err = family.divorce(&pid("P1")).unwrap_err();
        assert!(matches!(err, FamilyError::NotMarried { status: FamilyStatus::Single }));
        assert_eq!(family, before);
    }

    #[test]
    fn divorce_requires_member_custodial_parent() {
        let mut family = married_f1();
        assert!(matches!(
            family.divorce(&pid("P9")),
            Err(FamilyError::ParentNotFound { .. })
        ));
        assert_eq!(family.status(), FamilyStatus::Married);
    }

    #[test]
    fn non_custodial_family_id_is_stable_for_the_same_divorce() {
        let mut a = married_f1();
        let mut b = married_f1();
        let first = a.divorce(&pid("P1")).unwrap();
        let second = b.divorce(&pid("P1")).unwrap();
        assert_eq!(
            first.non_custodial_family_id().unwrap(),
            second.non_custodial_family_id().unwrap()
        );
    }

    #[test]
    fn restore_rejects_corrupt_state() {
        let result = Family::restore(
            fid("F"),
            FamilyStatus::Divorced,
            vec![parent("P1", "Jane", 1980), parent("P2", "John", 1979)],
            vec![],
            7,
        );
        assert!(matches!(result, Err(FamilyError::Structure(_))));
    }

    #[derive(Debug, Clone)]
    enum Op {
        AddParent(u8),
        AddChild(u8),
        RemoveChild(u8),
        Decease(u8, u16),
        Divorce(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::AddParent),
            (0u8..6).prop_map(Op::AddChild),
            (0u8..6).prop_map(Op::RemoveChild),
            (0u8..6, 0u16..20_000).prop_map(|(p, d)| Op::Decease(p, d)),
            (0u8..6).prop_map(Op::Divorce),
        ]
    }

    fn pool_parent(n: u8) -> Parent {
        Parent::try_new(
            &format!("P{n}"),
            &format!("Parent{n}"),
            "Doe",
            date(1960 + i32::from(n), 1, 1),
        )
        .unwrap()
    }

    fn apply(family: &mut Family, op: &Op) -> Result<(), FamilyError> {
        match op {
            Op::AddParent(n) => family.add_parent(pool_parent(*n)),
            Op::AddChild(n) => family.add_child(child(&format!("C{n}"), "Kid", 2000 + i32::from(*n))),
            Op::RemoveChild(n) => family.remove_child(&pid(&format!("C{n}"))).map(|_| ()),
            Op::Decease(n, days) => {
                let when = date(1950, 1, 1) + chrono::Duration::days(i64::from(*days) * 3);
                family.mark_parent_deceased(&pid(&format!("P{n}")), when)
            }
            Op::Divorce(n) => family.divorce(&pid(&format!("P{n}"))).map(|_| ()),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of lifecycle operations either commits a
        /// state that satisfies every invariant or leaves the family untouched.
        #[test]
        fn lifecycle_operations_preserve_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut family = Family::create(
                fid("F"),
                FamilyStatus::Single,
                vec![pool_parent(0)],
                vec![],
            ).unwrap();

            for op in ops {
                let before = family.clone();
                match apply(&mut family, &op) {
                    Ok(()) => {
                        prop_assert!(family.check_invariants().is_ok());
                        prop_assert_eq!(family.version(), before.version() + 1);
                    }
                    Err(_) => prop_assert_eq!(&family, &before),
                }
            }
        }
    }
}
