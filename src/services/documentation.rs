use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the festival back-end.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::festival_stream,
        crate::routes::festival::festival_status,
        crate::routes::festival::guild_festival,
        crate::routes::admin::create_festival,
        crate::routes::admin::close_festival,
        crate::routes::admin::purge_festival,
        crate::routes::admin::reconcile_guild,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::festival::CreateFestivalRequest,
            crate::dto::festival::FestivalFormatInput,
            crate::dto::festival::FestivalSummary,
            crate::dto::festival::FestivalStatusResponse,
            crate::dto::festival::ArmedTimer,
            crate::dto::admin::TriggerOutcome,
            crate::dto::admin::TriggerResponse,
            crate::dto::admin::PurgeReport,
            crate::dto::admin::PurgeResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::sse::ClosingProgressEvent,
            crate::dto::sse::PurgeCompletedEvent,
            crate::dto::sse::ManualInterventionEvent,
            crate::dto::sse::NoticeEvent,
            crate::state::lifecycle::FestivalPhase,
            crate::state::timers::TimerKind,
            crate::dao::models::RecordCategory,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "festivals", description = "Read-only festival status"),
        (name = "admin", description = "Festival lifecycle administration"),
    )
)]
/// OpenAPI document root.
pub struct ApiDoc;
