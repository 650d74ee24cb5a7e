use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use kinship_core::{AggregateRoot, FamilyId, PersonId};
use kinship_family::Family;

use super::record::FamilyRecord;
use super::r#trait::{FamilyStore, StoreError};

/// In-memory family store.
///
/// Intended for tests/dev. Families are kept as serialized records so every
/// load goes through the same validation a persistent backend applies.
#[derive(Debug, Default)]
pub struct InMemoryFamilyStore {
    records: RwLock<BTreeMap<FamilyId, FamilyRecord>>,
}

impl InMemoryFamilyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw record, bypassing aggregate validation on the way in.
    pub fn insert_record(&self, record: FamilyRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect(&self, keep: impl Fn(&FamilyRecord) -> bool) -> Result<Vec<Family>, StoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        records
            .values()
            .filter(|r| keep(r))
            .cloned()
            .map(FamilyRecord::into_family)
            .collect()
    }
}

fn poisoned() -> StoreError {
    StoreError::Permanent("lock poisoned".to_string())
}

#[async_trait]
impl FamilyStore for InMemoryFamilyStore {
    fn backend(&self) -> &'static str {
        "in_memory"
    }

    async fn load(&self, id: &FamilyId) -> Result<Family, StoreError> {
        let record = {
            let records = self.records.read().map_err(|_| poisoned())?;
            records.get(id).cloned()
        };
        record
            .ok_or_else(|| StoreError::family_not_found(id))?
            .into_family()
    }

    async fn store(&self, family: &Family) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(family.id().clone(), FamilyRecord::from_family(family));
        Ok(())
    }

    async fn load_by_parent(&self, parent_id: &PersonId) -> Result<Vec<Family>, StoreError> {
        self.collect(|r| r.has_parent(parent_id))
    }

    async fn load_by_child(&self, child_id: &PersonId) -> Result<Family, StoreError> {
        self.collect(|r| r.has_child(child_id))?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("family with child {child_id}")))
    }

    async fn load_all(&self) -> Result<Vec<Family>, StoreError> {
        self.collect(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use kinship_family::{Child, FamilyStatus, Parent};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn single(id: &str, parent: &str, children: &[&str]) -> Family {
        Family::create(
            FamilyId::parse(id).unwrap(),
            FamilyStatus::Single,
            vec![Parent::try_new(parent, "Ada", "King", date(1980, 1, 1)).unwrap()],
            children
                .iter()
                .map(|c| Child::try_new(c, "Byron", "King", date(2010, 1, 1)).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn pid(s: &str) -> PersonId {
        PersonId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = InMemoryFamilyStore::new();
        let family = single("F1", "P1", &["C1"]);
        store.store(&family).await.unwrap();

        assert_eq!(store.load(family.id()).await.unwrap(), family);
        assert!(matches!(
            store.load(&FamilyId::parse("F2").unwrap()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn save_replaces_existing_record() {
        let store = InMemoryFamilyStore::new();
        let mut family = single("F1", "P1", &[]);
        store.store(&family).await.unwrap();

        family
            .add_child(Child::try_new("C9", "Ada", "King", date(2015, 1, 1)).unwrap())
            .unwrap();
        store.store(&family).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.load(family.id()).await.unwrap().children().len(), 1);
    }

    #[tokio::test]
    async fn lookups_by_member() {
        let store = InMemoryFamilyStore::new();
        store.store(&single("F1", "P1", &["C1"])).await.unwrap();
        store.store(&single("F2", "P1", &["C2"])).await.unwrap();
        store.store(&single("F3", "P3", &[])).await.unwrap();

        assert_eq!(store.load_by_parent(&pid("P1")).await.unwrap().len(), 2);
        assert!(store.load_by_parent(&pid("P9")).await.unwrap().is_empty());
        assert_eq!(store.load_by_child(&pid("C2")).await.unwrap().id().as_str(), "F2");
        assert!(matches!(
            store.load_by_child(&pid("C9")).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.load_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn corrupt_record_fails_validation_on_load() {
        let store = InMemoryFamilyStore::new();
        let mut record = FamilyRecord::from_family(&single("F1", "P1", &[]));
        record.status = FamilyStatus::Married;
        store.insert_record(record).unwrap();

        assert!(matches!(
            store.load(&FamilyId::parse("F1").unwrap()).await,
            Err(StoreError::ValidationFailure(_))
        ));
    }
}
