use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dao::models::RecordCategory, dto::admin::PurgeReport, state::lifecycle::FestivalPhase};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a festival phase was persisted.
pub struct PhaseChangedEvent {
    pub festival_id: Uuid,
    pub guild_id: String,
    pub from: FestivalPhase,
    pub to: FestivalPhase,
}

#[derive(Debug, Serialize, ToSchema)]
/// Periodic report while a festival waits for running matches.
pub struct ClosingProgressEvent {
    pub festival_id: Uuid,
    pub active_matches: usize,
    pub matches: Vec<String>,
    /// Seconds left before closing is forced.
    pub remaining_secs: u64,
    pub polls: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once a festival was purged and removed.
pub struct PurgeCompletedEvent {
    pub festival_id: Uuid,
    pub guild_id: String,
    pub report: PurgeReport,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a purge left records behind.
pub struct ManualInterventionEvent {
    pub festival_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[schema(value_type = std::collections::HashMap<String, String>)]
    pub failures: IndexMap<RecordCategory, String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Copy of a notice delivered to the festival's announcement target.
pub struct NoticeEvent {
    pub festival_id: Uuid,
    pub target: String,
    pub message: String,
}
