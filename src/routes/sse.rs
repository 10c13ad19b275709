use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{
    services::{sse_events, sse_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/updates",
    tag = "sse",
    responses((status = 200, description = "Snapshot update stream", content_type = "text/event-stream", body = String))
)]
/// Stream every snapshot change, starting with an `info` event and the current cache content.
pub async fn updates_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    // Subscribe before the replay is built so no change falls in between.
    let receiver = sse_service::subscribe_updates(&state);
    info!(
        listeners = state.scheduler().cache().listeners(),
        "New update SSE connection"
    );

    let mut initial: Vec<_> = sse_events::info_event(&state).into_iter().collect();
    initial.extend(sse_events::replay_events(&state));
    sse_service::to_sse_stream(receiver, initial)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/updates", get(updates_stream))
}
