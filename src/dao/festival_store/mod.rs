/// In-memory store.
pub mod memory;
#[cfg(feature = "mongo-store")]
/// MongoDB store.
pub mod mongodb;

use crate::dao::models::{FestivalEntity, FestivalRecordEntity, RecordCategory};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::InMemoryFestivalStore;

/// Abstraction over the persistence layer for festivals and their tagged records.
pub trait FestivalStore: Send + Sync {
    /// Festival hosted by the guild, if any.
    fn find_festival(&self, guild_id: &str)
    -> BoxFuture<'static, StorageResult<Option<FestivalEntity>>>;
    /// Festival by id.
    fn find_festival_by_id(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<FestivalEntity>>>;
    /// Every stored festival.
    fn list_festivals(&self) -> BoxFuture<'static, StorageResult<Vec<FestivalEntity>>>;
    /// Insert or replace a festival.
    fn save_festival(&self, festival: FestivalEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a festival; `false` when it did not exist.
    fn delete_festival(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Insert or replace a tagged record.
    fn save_record(&self, record: FestivalRecordEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete every record of `category` tagged with `festival_id`, returning the count.
    fn purge_category(
        &self,
        category: RecordCategory,
        festival_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Delete orphaned and duplicated records of `category` for the guild.
    ///
    /// A record is orphaned when its tag differs from `live_festival`. Among records sharing
    /// a logical key only the most recently updated one survives.
    fn reconcile_category(
        &self,
        category: RecordCategory,
        guild_id: &str,
        live_festival: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Match records of the festival still marked active.
    fn list_active_matches(
        &self,
        festival_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<FestivalRecordEntity>>>;
    /// Cheap liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
