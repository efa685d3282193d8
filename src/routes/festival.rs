use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::festival::FestivalStatusResponse, error::AppError, services::lifecycle_service,
    state::SharedState,
};

/// Lifecycle status of a festival.
#[utoipa::path(
    get,
    path = "/festivals/{id}/status",
    tag = "festivals",
    params(("id" = String, Path, description = "Festival identifier")),
    responses(
        (status = 200, description = "Festival status", body = FestivalStatusResponse),
        (status = 404, description = "Unknown festival"),
    )
)]
pub async fn festival_status(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FestivalStatusResponse>, AppError> {
    Ok(Json(lifecycle_service::status(&state, id).await?))
}

/// Festival currently hosted by a guild.
#[utoipa::path(
    get,
    path = "/guilds/{guild_id}/festival",
    tag = "festivals",
    params(("guild_id" = String, Path, description = "Guild identifier")),
    responses(
        (status = 200, description = "Festival status", body = FestivalStatusResponse),
        (status = 404, description = "Guild hosts no festival"),
    )
)]
pub async fn guild_festival(
    State(state): State<SharedState>,
    Path(guild_id): Path<String>,
) -> Result<Json<FestivalStatusResponse>, AppError> {
    Ok(Json(lifecycle_service::guild_status(&state, &guild_id).await?))
}

/// Read-only festival routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/festivals/{id}/status", get(festival_status))
        .route("/guilds/{guild_id}/festival", get(guild_festival))
}
