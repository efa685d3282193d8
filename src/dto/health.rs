use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Festivals whose closing loop runs in this process.
    pub live_drains: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, live_drains: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            live_drains,
        }
    }
}
