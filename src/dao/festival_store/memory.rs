//! Process-local storage backend used for `FESTIVAL_STORE=memory` and in tests.

use std::{collections::HashMap, sync::Arc};

use dashmap::{DashMap, DashSet};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    festival_store::FestivalStore,
    models::{FestivalEntity, FestivalRecordEntity, RecordCategory},
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
/// DashMap-backed store. Clones share the same data.
pub struct InMemoryFestivalStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    festivals: DashMap<Uuid, FestivalEntity>,
    records: DashMap<Uuid, FestivalRecordEntity>,
    failing_categories: DashSet<RecordCategory>,
}

impl InMemoryFestivalStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every purge or reconcile of `category` fail until cleared.
    pub fn fail_category(&self, category: RecordCategory) {
        self.inner.failing_categories.insert(category);
    }

    /// Stop injecting failures for `category`.
    pub fn heal_category(&self, category: RecordCategory) {
        self.inner.failing_categories.remove(&category);
    }

    /// Number of stored records in `category`, regardless of tag.
    pub fn count_records(&self, category: RecordCategory) -> usize {
        self.inner
            .records
            .iter()
            .filter(|entry| entry.category == category)
            .count()
    }

    fn ensure_category_healthy(&self, category: RecordCategory) -> StorageResult<()> {
        if self.inner.failing_categories.contains(&category) {
            return Err(StorageError::Rejected(format!(
                "category `{category}` is not writable"
            )));
        }
        Ok(())
    }

    fn save_festival_sync(&self, festival: FestivalEntity) -> StorageResult<()> {
        let conflict = self
            .inner
            .festivals
            .iter()
            .any(|entry| entry.guild_id == festival.guild_id && entry.id != festival.id);
        if conflict {
            return Err(StorageError::Rejected(format!(
                "guild `{}` already hosts a festival",
                festival.guild_id
            )));
        }
        self.inner.festivals.insert(festival.id, festival);
        Ok(())
    }

    fn purge_category_sync(&self, category: RecordCategory, festival_id: Uuid) -> StorageResult<u64> {
        self.ensure_category_healthy(category)?;
        let mut removed = 0;
        self.inner.records.retain(|_, record| {
            let matches = record.category == category && record.festival_id == Some(festival_id);
            if matches {
                removed += 1;
            }
            !matches
        });
        Ok(removed)
    }

    fn reconcile_category_sync(
        &self,
        category: RecordCategory,
        guild_id: &str,
        live_festival: Option<Uuid>,
    ) -> StorageResult<u64> {
        self.ensure_category_healthy(category)?;
        let mut removed = 0;
        self.inner.records.retain(|_, record| {
            let orphan = record.category == category
                && record.guild_id == guild_id
                && record.festival_id != live_festival;
            if orphan {
                removed += 1;
            }
            !orphan
        });

        let mut by_key: HashMap<String, Vec<(std::time::SystemTime, Uuid)>> = HashMap::new();
        for entry in self.inner.records.iter() {
            if entry.category == category && entry.guild_id == guild_id {
                by_key
                    .entry(entry.logical_key.clone())
                    .or_default()
                    .push((entry.updated_at, entry.id));
            }
        }

        for mut versions in by_key.into_values() {
            // Newest first; the id breaks ties so the survivor is deterministic.
            versions.sort_by(|a, b| b.cmp(a));
            for (_, id) in versions.into_iter().skip(1) {
                if self.inner.records.remove(&id).is_some() {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

impl FestivalStore for InMemoryFestivalStore {
    fn find_festival(
        &self,
        guild_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<FestivalEntity>>> {
        let found = self
            .inner
            .festivals
            .iter()
            .find(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn find_festival_by_id(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FestivalEntity>>> {
        let found = self.inner.festivals.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn list_festivals(&self) -> BoxFuture<'static, StorageResult<Vec<FestivalEntity>>> {
        let festivals = self
            .inner
            .festivals
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        Box::pin(async move { Ok(festivals) })
    }

    fn save_festival(&self, festival: FestivalEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.save_festival_sync(festival);
        Box::pin(async move { result })
    }

    fn delete_festival(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let deleted = self.inner.festivals.remove(&id).is_some();
        Box::pin(async move { Ok(deleted) })
    }

    fn save_record(&self, record: FestivalRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.records.insert(record.id, record);
        Box::pin(async move { Ok(()) })
    }

    fn purge_category(
        &self,
        category: RecordCategory,
        festival_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let result = self.purge_category_sync(category, festival_id);
        Box::pin(async move { result })
    }

    fn reconcile_category(
        &self,
        category: RecordCategory,
        guild_id: &str,
        live_festival: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let result = self.reconcile_category_sync(category, guild_id, live_festival);
        Box::pin(async move { result })
    }

    fn list_active_matches(
        &self,
        festival_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<FestivalRecordEntity>>> {
        let matches = self
            .inner
            .records
            .iter()
            .filter(|entry| {
                entry.category == RecordCategory::Matches
                    && entry.festival_id == Some(festival_id)
                    && entry.active
            })
            .map(|entry| entry.value().clone())
            .collect();
        Box::pin(async move { Ok(matches) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn record(
        category: RecordCategory,
        festival_id: Option<Uuid>,
        key: &str,
        age_secs: u64,
    ) -> FestivalRecordEntity {
        FestivalRecordEntity {
            id: Uuid::new_v4(),
            category,
            guild_id: "100000000000000001".into(),
            festival_id,
            logical_key: key.into(),
            label: key.into(),
            active: false,
            updated_at: SystemTime::UNIX_EPOCH + Duration::from_secs(10_000 - age_secs),
        }
    }

    #[tokio::test]
    async fn purge_only_touches_tagged_records() {
        let store = InMemoryFestivalStore::new();
        let festival = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .save_record(record(RecordCategory::Votes, Some(festival), "a", 0))
            .await
            .unwrap();
        store
            .save_record(record(RecordCategory::Votes, Some(other), "b", 0))
            .await
            .unwrap();

        let removed = store
            .purge_category(RecordCategory::Votes, festival)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count_records(RecordCategory::Votes), 1);
    }

    #[tokio::test]
    async fn reconcile_keeps_newest_duplicate() {
        let store = InMemoryFestivalStore::new();
        let festival = Uuid::new_v4();
        let newest = record(RecordCategory::Teams, Some(festival), "squid", 1);
        let newest_id = newest.id;
        store.save_record(newest).await.unwrap();
        store
            .save_record(record(RecordCategory::Teams, Some(festival), "squid", 50))
            .await
            .unwrap();
        store
            .save_record(record(RecordCategory::Teams, None, "orphan", 0))
            .await
            .unwrap();

        let removed = store
            .reconcile_category(RecordCategory::Teams, "100000000000000001", Some(festival))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.inner.records.contains_key(&newest_id));
    }

    #[tokio::test]
    async fn second_festival_for_guild_is_rejected() {
        use crate::test_support::festival_fixture;

        let store = InMemoryFestivalStore::new();
        let first = festival_fixture(SystemTime::now());
        let mut second = festival_fixture(SystemTime::now());
        second.guild_id = first.guild_id.clone();

        store.save_festival(first).await.unwrap();
        assert!(matches!(
            store.save_festival(second).await,
            Err(StorageError::Rejected(_))
        ));
    }
}
