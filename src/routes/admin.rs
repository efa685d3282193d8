use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_valid::Valid;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dto::{
        admin::{PurgeReport, PurgeResponse, TriggerOutcome, TriggerResponse},
        festival::{CreateFestivalRequest, FestivalSummary},
        validation::validate_guild_id,
    },
    error::{AppError, ServiceError},
    services::{
        closing_service::CloseOutcome,
        lifecycle_service,
        purge_service::{self, failure_summary},
    },
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const EVENT_ID_HEADER: &str = "x-event-id";
const ACTOR_ID_HEADER: &str = "x-actor-id";
const DEFAULT_ACTOR: &str = "admin";

/// Admin-only endpoints driving the festival lifecycle.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/festivals", post(create_festival))
        .route("/admin/guilds/{guild_id}/festival/close", post(close_festival))
        .route("/admin/festivals/{id}/purge", post(purge_festival))
        .route("/admin/guilds/{guild_id}/reconcile", post(reconcile_guild))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Create a festival and arm its timers.
#[utoipa::path(
    post,
    path = "/admin/festivals",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("X-Event-Id" = Option<String>, Header, description = "Idempotency key of the trigger"),
        ("X-Actor-Id" = Option<String>, Header, description = "Who issued the trigger"),
    ),
    request_body = CreateFestivalRequest,
    responses(
        (status = 201, description = "Festival created", body = FestivalSummary),
        (status = 200, description = "Trigger already handled", body = TriggerResponse),
        (status = 409, description = "Guild already hosts a festival"),
    )
)]
pub async fn create_festival(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Valid(Json(payload)): Valid<Json<CreateFestivalRequest>>,
) -> Result<Response, AppError> {
    if !admit(&state, &headers, "festival:create") {
        return Ok(Json(TriggerResponse::already_handled()).into_response());
    }

    let summary = lifecycle_service::create(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

/// Close the guild's festival immediately.
#[utoipa::path(
    post,
    path = "/admin/guilds/{guild_id}/festival/close",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("X-Event-Id" = Option<String>, Header, description = "Idempotency key of the trigger"),
        ("guild_id" = String, Path, description = "Guild hosting the festival"),
    ),
    responses(
        (status = 200, description = "Close outcome", body = TriggerResponse),
        (status = 500, description = "Purge incomplete; manual intervention required"),
    )
)]
pub async fn close_festival(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(guild_id): Path<String>,
) -> Result<Json<TriggerResponse>, AppError> {
    check_guild_id(&guild_id)?;
    if !admit(&state, &headers, "festival:close") {
        return Ok(Json(TriggerResponse::already_handled()));
    }

    let outcome = match lifecycle_service::force_close(&state, &guild_id).await? {
        CloseOutcome::Finished(_) | CloseOutcome::Interrupted => TriggerOutcome::Completed,
        CloseOutcome::Skipped | CloseOutcome::AlreadyDraining => TriggerOutcome::NoOp,
        CloseOutcome::ManualIntervention(result) => {
            return Err(ServiceError::ManualInterventionRequired(failure_summary(&result)).into());
        }
    };
    Ok(Json(TriggerResponse { outcome }))
}

/// Delete every record tagged with the festival.
#[utoipa::path(
    post,
    path = "/admin/festivals/{id}/purge",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("X-Event-Id" = Option<String>, Header, description = "Idempotency key of the trigger"),
        ("id" = String, Path, description = "Festival whose records are purged"),
    ),
    responses(
        (status = 200, description = "Purge report", body = PurgeResponse),
        (status = 500, description = "Purge incomplete; manual intervention required"),
    )
)]
pub async fn purge_festival(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PurgeResponse>, AppError> {
    if !admit(&state, &headers, "maintenance:purge") {
        return Ok(Json(PurgeResponse {
            outcome: TriggerOutcome::AlreadyHandled,
            report: None,
        }));
    }

    let result = purge_service::purge_festival(&state, id).await?;
    Ok(Json(PurgeResponse {
        outcome: TriggerOutcome::Completed,
        report: Some(PurgeReport::from(&result)),
    }))
}

/// Remove orphaned and duplicated records of the guild.
#[utoipa::path(
    post,
    path = "/admin/guilds/{guild_id}/reconcile",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("X-Event-Id" = Option<String>, Header, description = "Idempotency key of the trigger"),
        ("guild_id" = String, Path, description = "Guild to reconcile"),
    ),
    responses((status = 200, description = "Reconcile report", body = PurgeResponse))
)]
pub async fn reconcile_guild(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(guild_id): Path<String>,
) -> Result<Json<PurgeResponse>, AppError> {
    check_guild_id(&guild_id)?;
    if !admit(&state, &headers, "maintenance:reconcile") {
        return Ok(Json(PurgeResponse {
            outcome: TriggerOutcome::AlreadyHandled,
            report: None,
        }));
    }

    let result = purge_service::reconcile_duplicates(&state, &guild_id).await?;
    Ok(Json(PurgeResponse {
        outcome: TriggerOutcome::Completed,
        report: Some(PurgeReport::from(&result)),
    }))
}

/// Run the trigger through the dedup guard. A missing event id gets a fresh one, so only
/// the actor-based checks apply.
fn admit(state: &SharedState, headers: &HeaderMap, action_kind: &str) -> bool {
    let event_id = header_value(headers, EVENT_ID_HEADER)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let actor = header_value(headers, ACTOR_ID_HEADER).unwrap_or_else(|| DEFAULT_ACTOR.into());

    let admitted = state
        .dedup()
        .admit(&event_id, &actor, action_kind, state.clock().now_ms());
    if !admitted {
        debug!(event_id, actor, action_kind, "admin trigger already handled");
    }
    admitted
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn check_guild_id(guild_id: &str) -> Result<(), AppError> {
    validate_guild_id(guild_id).map_err(|err| {
        AppError::BadRequest(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| "invalid guild id".into()),
        )
    })
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.config().admin_token.as_deref() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized("admin token not configured".into())),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{festival_store::FestivalStore, models::RecordCategory},
        routes,
        test_support::{TestHarness, tagged_record},
    };

    const TOKEN: &str = "secret";

    async fn harness() -> TestHarness {
        TestHarness::with_config(AppConfig {
            admin_token: Some(TOKEN.into()),
            ..AppConfig::default()
        })
        .await
    }

    fn purge_request(festival_id: Uuid, token: Option<&str>, event_id: &str) -> Request<Body> {
        let mut builder = Request::post(format!("/admin/festivals/{festival_id}/purge"))
            .header(EVENT_ID_HEADER, event_id);
        if let Some(token) = token {
            builder = builder.header(ADMIN_TOKEN_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn repeated_event_id_is_already_handled_without_side_effect() {
        let harness = harness().await;
        let app = routes::router(harness.state.clone());
        let festival_id = Uuid::new_v4();
        harness
            .store
            .save_record(tagged_record(RecordCategory::Matches, festival_id, "match-1", false))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(purge_request(festival_id, Some(TOKEN), "evt-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["outcome"], "completed");
        assert_eq!(body["report"]["total"], 1);

        harness
            .store
            .save_record(tagged_record(RecordCategory::Matches, festival_id, "match-2", false))
            .await
            .unwrap();
        let response = app
            .oneshot(purge_request(festival_id, Some(TOKEN), "evt-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "outcome": "already_handled" })
        );
        assert_eq!(harness.store.count_records(RecordCategory::Matches), 1);
    }

    #[tokio::test]
    async fn missing_or_wrong_admin_token_is_refused() {
        let harness = harness().await;
        let app = routes::router(harness.state.clone());
        let festival_id = Uuid::new_v4();
        harness
            .store
            .save_record(tagged_record(RecordCategory::Votes, festival_id, "vote-1", false))
            .await
            .unwrap();

        let missing = app
            .clone()
            .oneshot(purge_request(festival_id, None, "evt-missing"))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(purge_request(festival_id, Some("nope"), "evt-wrong"))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(harness.store.count_records(RecordCategory::Votes), 1);
        assert_eq!(harness.state.dedup().tracked_events(), 0);
    }
}
