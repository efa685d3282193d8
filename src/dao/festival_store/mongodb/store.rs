use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::connect_festival_db,
    error::{MongoDaoError, MongoResult},
    models::{MongoFestivalDocument, MongoRecordDocument, bson_uuid, doc_id, record_collection_name},
};
use crate::dao::{
    festival_store::FestivalStore,
    models::{FestivalEntity, FestivalRecordEntity, RecordCategory},
    storage::StorageResult,
};

const FESTIVAL_COLLECTION_NAME: &str = "festivals";

#[derive(Clone)]
/// MongoDB-backed [`FestivalStore`](crate::dao::festival_store::FestivalStore).
pub struct MongoFestivalStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            connect_festival_db(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoFestivalStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            connect_festival_db(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let festivals = self.festival_collection().await;
        let guild_index = IndexModel::builder()
            .keys(doc! {"guild_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("festival_guild_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        festivals
            .create_index(guild_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: FESTIVAL_COLLECTION_NAME.to_owned(),
                index: "guild_id",
                source,
            })?;

        for category in RecordCategory::ALL {
            let collection = self.record_collection(category).await;
            let name = record_collection_name(category);

            let tag_index = IndexModel::builder()
                .keys(doc! {"festival_id": 1})
                .options(
                    IndexOptions::builder()
                        .name(Some("record_festival_idx".to_owned()))
                        .build(),
                )
                .build();
            collection
                .create_index(tag_index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: name.clone(),
                    index: "festival_id",
                    source,
                })?;

            let key_index = IndexModel::builder()
                .keys(doc! {"guild_id": 1, "logical_key": 1})
                .options(
                    IndexOptions::builder()
                        .name(Some("record_guild_key_idx".to_owned()))
                        .build(),
                )
                .build();
            collection
                .create_index(key_index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: name,
                    index: "guild_id,logical_key",
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn festival_collection(&self) -> Collection<MongoFestivalDocument> {
        self.database()
            .await
            .collection::<MongoFestivalDocument>(FESTIVAL_COLLECTION_NAME)
    }

    async fn record_collection(&self, category: RecordCategory) -> Collection<MongoRecordDocument> {
        self.database()
            .await
            .collection::<MongoRecordDocument>(&record_collection_name(category))
    }

    async fn find_festival(&self, guild_id: String) -> MongoResult<Option<FestivalEntity>> {
        let collection = self.festival_collection().await;
        let document = collection
            .find_one(doc! {"guild_id": guild_id.as_str()})
            .await
            .map_err(|source| MongoDaoError::LoadFestival {
                key: guild_id,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_festival_by_id(&self, id: Uuid) -> MongoResult<Option<FestivalEntity>> {
        let collection = self.festival_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadFestival {
                key: id.to_string(),
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_festivals(&self) -> MongoResult<Vec<FestivalEntity>> {
        let collection = self.festival_collection().await;
        let documents: Vec<MongoFestivalDocument> = collection
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListFestivals { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListFestivals { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_festival(&self, festival: FestivalEntity) -> MongoResult<()> {
        let id = festival.id;
        let document: MongoFestivalDocument = festival.into();
        let collection = self.festival_collection().await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveFestival { id, source })?;
        Ok(())
    }

    async fn delete_festival(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.festival_collection().await;
        let result = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteFestival { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn save_record(&self, record: FestivalRecordEntity) -> MongoResult<()> {
        let id = record.id;
        let category = record.category;
        let document: MongoRecordDocument = record.into();
        let collection = self.record_collection(category).await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRecord {
                id,
                collection: record_collection_name(category),
                source,
            })?;
        Ok(())
    }

    async fn purge_category(&self, category: RecordCategory, festival_id: Uuid) -> MongoResult<u64> {
        let collection = self.record_collection(category).await;
        let result = collection
            .delete_many(doc! {"festival_id": bson_uuid(festival_id)})
            .await
            .map_err(|source| MongoDaoError::DeleteRecords {
                collection: record_collection_name(category),
                source,
            })?;
        Ok(result.deleted_count)
    }

    async fn reconcile_category(
        &self,
        category: RecordCategory,
        guild_id: String,
        live_festival: Option<Uuid>,
    ) -> MongoResult<u64> {
        let name = record_collection_name(category);
        let collection = self.record_collection(category).await;

        let orphan_filter = match live_festival {
            Some(live) => doc! {"guild_id": guild_id.as_str(), "festival_id": {"$ne": bson_uuid(live)}},
            None => doc! {"guild_id": guild_id.as_str()},
        };
        let orphans = collection
            .delete_many(orphan_filter)
            .await
            .map_err(|source| MongoDaoError::DeleteRecords {
                collection: name.clone(),
                source,
            })?
            .deleted_count;

        let pipeline = vec![
            doc! {"$match": {"guild_id": guild_id.as_str()}},
            doc! {"$sort": {"updated_at": -1, "_id": -1}},
            doc! {"$group": {
                "_id": "$logical_key",
                "ids": {"$push": "$_id"},
                "count": {"$sum": 1},
            }},
            doc! {"$match": {"count": {"$gt": 1}}},
        ];
        let groups: Vec<Document> = collection
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::QueryRecords {
                collection: name.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryRecords {
                collection: name.clone(),
                source,
            })?;

        let mut stale: Vec<Bson> = Vec::new();
        for group in groups {
            let ids = group
                .get_array("ids")
                .map_err(|err| MongoDaoError::MalformedDocument {
                    collection: name.clone(),
                    reason: err.to_string(),
                })?;
            stale.extend(ids.iter().skip(1).cloned());
        }

        if stale.is_empty() {
            return Ok(orphans);
        }

        let duplicates = collection
            .delete_many(doc! {"_id": {"$in": stale}})
            .await
            .map_err(|source| MongoDaoError::DeleteRecords {
                collection: name,
                source,
            })?
            .deleted_count;

        Ok(orphans + duplicates)
    }

    async fn list_active_matches(&self, festival_id: Uuid) -> MongoResult<Vec<FestivalRecordEntity>> {
        let category = RecordCategory::Matches;
        let collection = self.record_collection(category).await;
        let documents: Vec<MongoRecordDocument> = collection
            .find(doc! {"festival_id": bson_uuid(festival_id), "active": true})
            .await
            .map_err(|source| MongoDaoError::QueryRecords {
                collection: record_collection_name(category),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::QueryRecords {
                collection: record_collection_name(category),
                source,
            })?;

        Ok(documents
            .into_iter()
            .map(|doc| doc.into_entity(category))
            .collect())
    }
}

impl FestivalStore for MongoFestivalStore {
    fn find_festival(
        &self,
        guild_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<FestivalEntity>>> {
        let store = self.clone();
        let guild_id = guild_id.to_owned();
        Box::pin(async move { store.find_festival(guild_id).await.map_err(Into::into) })
    }

    fn find_festival_by_id(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<FestivalEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_festival_by_id(id).await.map_err(Into::into) })
    }

    fn list_festivals(&self) -> BoxFuture<'static, StorageResult<Vec<FestivalEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_festivals().await.map_err(Into::into) })
    }

    fn save_festival(&self, festival: FestivalEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_festival(festival).await.map_err(Into::into) })
    }

    fn delete_festival(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_festival(id).await.map_err(Into::into) })
    }

    fn save_record(&self, record: FestivalRecordEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_record(record).await.map_err(Into::into) })
    }

    fn purge_category(
        &self,
        category: RecordCategory,
        festival_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .purge_category(category, festival_id)
                .await
                .map_err(Into::into)
        })
    }

    fn reconcile_category(
        &self,
        category: RecordCategory,
        guild_id: &str,
        live_festival: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        let guild_id = guild_id.to_owned();
        Box::pin(async move {
            store
                .reconcile_category(category, guild_id, live_festival)
                .await
                .map_err(Into::into)
        })
    }

    fn list_active_matches(
        &self,
        festival_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<FestivalRecordEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_active_matches(festival_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
