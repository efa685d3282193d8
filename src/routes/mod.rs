use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Admin lifecycle triggers.
pub mod admin;
/// Read-only festival status.
pub mod festival;
/// Health check.
pub mod health;
/// Lifecycle event stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(festival::router())
        .merge(admin::router(state.clone()));

    api_router.merge(docs_router()).with_state(state)
}

/// Serve the Swagger UI backed by the generated OpenAPI document.
fn docs_router() -> Router<SharedState> {
    SwaggerUi::new("/docs")
        .url("/api-doc/openapi.json", ApiDoc::openapi())
        .into()
}
