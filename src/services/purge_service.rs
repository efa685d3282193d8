//! Set-based deletion of everything a festival left behind.

use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::RecordCategory, error::ServiceError, services::sse_events, state::SharedState,
};

/// Per-category outcome of a purge or reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeResult {
    /// Deleted records per category, in [`RecordCategory::ALL`] order. Zero included.
    pub counts: IndexMap<RecordCategory, u64>,
    /// Whether the festival was closed before its matches drained.
    pub forced: bool,
    /// Categories that could not be cleaned, with the reason.
    pub failures: IndexMap<RecordCategory, String>,
}

impl PurgeResult {
    fn empty() -> Self {
        Self {
            counts: IndexMap::with_capacity(RecordCategory::ALL.len()),
            forced: false,
            failures: IndexMap::new(),
        }
    }

    /// Records deleted across categories.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Some category failed; an operator has to look at it.
    pub fn requires_manual_intervention(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, category: RecordCategory, outcome: Result<u64, String>) {
        match outcome {
            Ok(count) => {
                self.counts.insert(category, count);
            }
            Err(reason) => {
                self.counts.insert(category, 0);
                self.failures.insert(category, reason);
            }
        }
    }
}

/// Delete every record tagged with `festival_id`, category by category.
///
/// A failing category does not stop the others. Running it twice yields zero counts.
pub async fn purge_all(state: &SharedState, festival_id: Uuid) -> Result<PurgeResult, ServiceError> {
    let store = state.require_store().await?;
    let mut result = PurgeResult::empty();

    for category in RecordCategory::ALL {
        let outcome = store
            .purge_category(category, festival_id)
            .await
            .map_err(|err| {
                warn!(festival_id = %festival_id, %category, error = %err, "purge failed for category");
                err.to_string()
            });
        result.record(category, outcome);
    }

    info!(
        festival_id = %festival_id,
        deleted = result.total(),
        failures = result.failures.len(),
        "festival records purged"
    );
    Ok(result)
}

/// Administrative purge: same as [`purge_all`] but a partial failure is an error.
pub async fn purge_festival(
    state: &SharedState,
    festival_id: Uuid,
) -> Result<PurgeResult, ServiceError> {
    let result = purge_all(state, festival_id).await?;
    if result.requires_manual_intervention() {
        sse_events::broadcast_manual_intervention(state, festival_id, None, &result);
        return Err(ServiceError::ManualInterventionRequired(failure_summary(&result)));
    }
    Ok(result)
}

/// Remove orphaned and duplicated records of a guild.
///
/// Records tagged with anything but the guild's current festival are orphans. Among
/// records sharing a logical key only the newest survives.
pub async fn reconcile_duplicates(
    state: &SharedState,
    guild_id: &str,
) -> Result<PurgeResult, ServiceError> {
    let store = state.require_store().await?;
    let live = store.find_festival(guild_id).await?.map(|festival| festival.id);
    let mut result = PurgeResult::empty();

    for category in RecordCategory::ALL {
        let outcome = store
            .reconcile_category(category, guild_id, live)
            .await
            .map_err(|err| {
                warn!(guild_id, %category, error = %err, "reconcile failed for category");
                err.to_string()
            });
        result.record(category, outcome);
    }

    info!(
        guild_id,
        live_festival = ?live,
        deleted = result.total(),
        "guild records reconciled"
    );
    if result.requires_manual_intervention() {
        return Err(ServiceError::ManualInterventionRequired(failure_summary(&result)));
    }
    Ok(result)
}

/// One line listing the failed categories and why.
pub fn failure_summary(result: &PurgeResult) -> String {
    result
        .failures
        .iter()
        .map(|(category, reason)| format!("{category}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::festival_store::FestivalStore,
        test_support::{TestHarness, festival_fixture, tagged_record},
    };

    async fn seed(harness: &TestHarness, festival_id: Uuid) {
        for category in RecordCategory::ALL {
            for key in ["alpha", "beta"] {
                harness
                    .store
                    .save_record(tagged_record(category, festival_id, key, false))
                    .await
                    .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn second_purge_reports_all_zeros() {
        let harness = TestHarness::new().await;
        let festival_id = Uuid::new_v4();
        seed(&harness, festival_id).await;

        let first = purge_all(&harness.state, festival_id).await.unwrap();
        assert_eq!(first.counts.len(), RecordCategory::ALL.len());
        assert!(first.counts.values().all(|count| *count == 2));

        let second = purge_all(&harness.state, festival_id).await.unwrap();
        assert_eq!(
            second.counts.keys().copied().collect::<Vec<_>>(),
            RecordCategory::ALL.to_vec()
        );
        assert!(second.counts.values().all(|count| *count == 0));
        assert!(!second.requires_manual_intervention());
    }

    #[tokio::test]
    async fn failing_category_does_not_stop_the_others() {
        let harness = TestHarness::new().await;
        let festival_id = Uuid::new_v4();
        seed(&harness, festival_id).await;
        harness.store.fail_category(RecordCategory::Votes);

        let result = purge_all(&harness.state, festival_id).await.unwrap();
        assert!(result.requires_manual_intervention());
        assert!(result.failures.contains_key(&RecordCategory::Votes));
        assert_eq!(result.counts[&RecordCategory::Counters], 2);
        assert_eq!(harness.store.count_records(RecordCategory::Votes), 2);

        let err = purge_festival(&harness.state, festival_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::ManualInterventionRequired(_)));
    }

    #[tokio::test]
    async fn reconcile_leaves_live_state_alone() {
        let harness = TestHarness::new().await;
        let festival = festival_fixture(harness.now());
        harness.store.save_festival(festival.clone()).await.unwrap();
        harness
            .store
            .save_record(tagged_record(RecordCategory::Teams, festival.id, "squid", false))
            .await
            .unwrap();
        harness
            .store
            .save_record(tagged_record(RecordCategory::Teams, Uuid::new_v4(), "old", false))
            .await
            .unwrap();

        let result = reconcile_duplicates(&harness.state, &festival.guild_id)
            .await
            .unwrap();
        assert_eq!(result.counts[&RecordCategory::Teams], 1);
        assert_eq!(harness.store.count_records(RecordCategory::Teams), 1);

        let again = reconcile_duplicates(&harness.state, &festival.guild_id)
            .await
            .unwrap();
        assert_eq!(again.total(), 0);
    }
}
