use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/festivals",
    tag = "sse",
    responses((status = 200, description = "Festival lifecycle events", content_type = "text/event-stream", body = String))
)]
/// Stream lifecycle events: phase changes, closing progress, purges and notices.
pub async fn festival_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let receiver = sse_service::subscribe(&state);
    info!("New festival SSE connection");
    let handshake = sse_service::handshake(&state).await;
    sse_service::to_sse_stream(receiver, handshake)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/festivals", get(festival_stream))
}
