//! DTO definitions used by the admin REST API and documentation layer.

use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{dao::models::RecordCategory, services::purge_service::PurgeResult};

/// How an admin trigger was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The operation ran.
    Completed,
    /// Nothing to do in the current state.
    NoOp,
    /// The same trigger was already processed.
    AlreadyHandled,
}

/// Generic acknowledgement returned by trigger endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct TriggerResponse {
    pub outcome: TriggerOutcome,
}

impl TriggerResponse {
    pub fn already_handled() -> Self {
        Self {
            outcome: TriggerOutcome::AlreadyHandled,
        }
    }
}

/// Per-category deletion counts.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurgeReport {
    #[schema(value_type = std::collections::HashMap<String, u64>)]
    pub counts: IndexMap<RecordCategory, u64>,
    pub total: u64,
    pub forced: bool,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    #[schema(value_type = std::collections::HashMap<String, String>)]
    pub failures: IndexMap<RecordCategory, String>,
}

impl From<&PurgeResult> for PurgeReport {
    fn from(result: &PurgeResult) -> Self {
        Self {
            counts: result.counts.clone(),
            total: result.total(),
            forced: result.forced,
            failures: result.failures.clone(),
        }
    }
}

/// Response of the purge and reconcile endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct PurgeResponse {
    pub outcome: TriggerOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PurgeReport>,
}
