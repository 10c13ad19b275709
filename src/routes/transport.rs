use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use indexmap::IndexMap;
use validator::Validate;

use crate::{
    dto::transport::{
        NamedSnapshot, RateLimitResponse, RefreshRequest, ServerSnapshot, ServersQuery,
        SnapshotQuery, TransportRequest, TransportResponse,
    },
    error::AppError,
    services::transport,
    state::{SharedState, cache::Snapshot, event::ServerDescriptor},
};

/// Transport boundary: one RPC route plus one REST route per request kind.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/rpc", post(rpc))
        .route("/servers", get(list_servers))
        .route("/rate-limit", get(rate_limit))
        .route("/snapshot", get(snapshot))
        .route("/snapshots", get(snapshots))
        .route("/refresh", post(refresh))
        .route("/refresh-all", post(refresh_all))
}

/// Execute any transport request.
#[utoipa::path(
    post,
    path = "/rpc",
    tag = "transport",
    request_body = TransportRequest,
    responses(
        (status = 200, description = "Request handled", body = TransportResponse),
        (status = 400, description = "Invalid request payload"),
        (status = 404, description = "Unknown server, or none to default to"),
        (status = 502, description = "Server directory could not be fetched")
    )
)]
pub async fn rpc(
    State(state): State<SharedState>,
    Json(request): Json<TransportRequest>,
) -> Result<Json<TransportResponse>, AppError> {
    request.validate()?;
    Ok(Json(transport::dispatch(&state, request).await?))
}

/// List the servers published by the event API.
#[utoipa::path(
    get,
    path = "/servers",
    tag = "transport",
    params(ServersQuery),
    responses(
        (status = 200, description = "Known servers", body = [ServerDescriptor]),
        (status = 502, description = "Server directory could not be fetched")
    )
)]
pub async fn list_servers(
    State(state): State<SharedState>,
    Query(query): Query<ServersQuery>,
) -> Result<Json<Vec<ServerDescriptor>>, AppError> {
    Ok(Json(transport::get_servers(&state, query.refresh).await?))
}

/// Report the shared rate limit budget.
#[utoipa::path(
    get,
    path = "/rate-limit",
    tag = "transport",
    responses((status = 200, description = "Rate limit budget", body = RateLimitResponse))
)]
pub async fn rate_limit(State(state): State<SharedState>) -> Json<RateLimitResponse> {
    Json(transport::get_rate_limit(&state).await)
}

/// Return the cached snapshot of one server and refresh it in the background.
#[utoipa::path(
    get,
    path = "/snapshot",
    tag = "transport",
    params(SnapshotQuery),
    responses(
        (status = 200, description = "Cached snapshot", body = ServerSnapshot),
        (status = 400, description = "Invalid server id"),
        (status = 404, description = "Unknown server, or none to default to"),
        (status = 502, description = "Server directory could not be fetched")
    )
)]
pub async fn snapshot(
    State(state): State<SharedState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<ServerSnapshot>, AppError> {
    TransportRequest::Get {
        server_id: query.server_id.clone(),
    }
    .validate()?;
    Ok(Json(transport::get_snapshot(&state, query.server_id).await?))
}

/// Return the cached snapshots of every known server.
#[utoipa::path(
    get,
    path = "/snapshots",
    tag = "transport",
    responses((status = 200, description = "Cached snapshots by server id", body = IndexMap<String, NamedSnapshot>))
)]
pub async fn snapshots(State(state): State<SharedState>) -> Json<IndexMap<String, NamedSnapshot>> {
    Json(transport::get_all(&state).await)
}

/// Refresh one server and wait for the outcome.
#[utoipa::path(
    post,
    path = "/refresh",
    tag = "transport",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Snapshot after the refresh", body = ServerSnapshot),
        (status = 400, description = "Invalid server id"),
        (status = 404, description = "Unknown server, or none to default to"),
        (status = 502, description = "Server directory could not be fetched")
    )
)]
pub async fn refresh(
    State(state): State<SharedState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<ServerSnapshot>, AppError> {
    TransportRequest::Refresh {
        server_id: request.server_id.clone(),
        forced: request.forced,
    }
    .validate()?;
    Ok(Json(
        transport::refresh(&state, request.server_id, request.forced).await?,
    ))
}

/// Force a refresh of every known server.
#[utoipa::path(
    post,
    path = "/refresh-all",
    tag = "transport",
    responses((status = 200, description = "Snapshots by server id", body = IndexMap<String, Snapshot>))
)]
pub async fn refresh_all(State(state): State<SharedState>) -> Json<IndexMap<String, Snapshot>> {
    Json(transport::refresh_all(&state).await)
}
