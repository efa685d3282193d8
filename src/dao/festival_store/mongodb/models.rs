use mongodb::bson::{self, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dao::models::{FestivalEntity, FestivalFormatEntity, FestivalRecordEntity, RecordCategory},
    state::lifecycle::FestivalPhase,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Stored shape of a festival.
pub struct MongoFestivalDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    guild_id: String,
    title: String,
    sides: [String; 3],
    start_time: DateTime,
    end_time: DateTime,
    phase: FestivalPhase,
    #[serde(default)]
    closing: bool,
    #[serde(default)]
    halfway_announced: bool,
    announcement_target: String,
    format: FestivalFormatEntity,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<FestivalEntity> for MongoFestivalDocument {
    fn from(value: FestivalEntity) -> Self {
        Self {
            id: bson_uuid(value.id),
            guild_id: value.guild_id,
            title: value.title,
            sides: value.sides,
            start_time: DateTime::from_system_time(value.start_time),
            end_time: DateTime::from_system_time(value.end_time),
            phase: value.phase,
            closing: value.closing,
            halfway_announced: value.halfway_announced,
            announcement_target: value.announcement_target,
            format: value.format,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoFestivalDocument> for FestivalEntity {
    fn from(value: MongoFestivalDocument) -> Self {
        Self {
            id: Uuid::from_bytes(value.id.bytes()),
            guild_id: value.guild_id,
            title: value.title,
            sides: value.sides,
            start_time: value.start_time.to_system_time(),
            end_time: value.end_time.to_system_time(),
            phase: value.phase,
            closing: value.closing,
            halfway_announced: value.halfway_announced,
            announcement_target: value.announcement_target,
            format: value.format,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Record document; the category is implied by the collection it lives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRecordDocument {
    #[serde(rename = "_id")]
    id: bson::Uuid,
    guild_id: String,
    #[serde(default)]
    festival_id: Option<bson::Uuid>,
    logical_key: String,
    label: String,
    #[serde(default)]
    active: bool,
    updated_at: DateTime,
}

impl From<FestivalRecordEntity> for MongoRecordDocument {
    fn from(value: FestivalRecordEntity) -> Self {
        Self {
            id: bson_uuid(value.id),
            guild_id: value.guild_id,
            festival_id: value.festival_id.map(bson_uuid),
            logical_key: value.logical_key,
            label: value.label,
            active: value.active,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl MongoRecordDocument {
    /// Convert into a domain record of `category`.
    pub fn into_entity(self, category: RecordCategory) -> FestivalRecordEntity {
        FestivalRecordEntity {
            id: Uuid::from_bytes(self.id.bytes()),
            category,
            guild_id: self.guild_id,
            festival_id: self.festival_id.map(|id| Uuid::from_bytes(id.bytes())),
            logical_key: self.logical_key,
            label: self.label,
            active: self.active,
            updated_at: self.updated_at.to_system_time(),
        }
    }
}

/// Collection holding the records of one category.
pub fn record_collection_name(category: RecordCategory) -> String {
    format!("festival_{}", category.as_str())
}

/// Binary BSON form of a uuid.
pub fn bson_uuid(id: Uuid) -> bson::Uuid {
    bson::Uuid::from_bytes(id.into_bytes())
}

/// `_id` filter for a uuid.
pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": bson_uuid(id)}
}
