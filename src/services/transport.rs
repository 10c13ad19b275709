//! Handlers of the transport boundary. Every [`TransportRequest`] variant maps
//! to exactly one operation below.

use futures::future::join_all;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
    dto::transport::{
        NamedSnapshot, RateLimitResponse, ServerSnapshot, TransportRequest, TransportResponse,
    },
    error::ServiceError,
    state::{SharedState, cache::Snapshot, clock::Clock, event::ServerDescriptor, prediction},
};

/// Route a request to its operation.
pub async fn dispatch(
    state: &SharedState,
    request: TransportRequest,
) -> Result<TransportResponse, ServiceError> {
    debug!(?request, "dispatching transport request");
    match request {
        TransportRequest::GetServers { refresh } => get_servers(state, refresh)
            .await
            .map(TransportResponse::Servers),
        TransportRequest::GetRateLimit => {
            Ok(TransportResponse::RateLimit(get_rate_limit(state).await))
        }
        TransportRequest::Get { server_id } => get_snapshot(state, server_id)
            .await
            .map(TransportResponse::Snapshot),
        TransportRequest::GetAll => Ok(TransportResponse::All(get_all(state).await)),
        TransportRequest::Refresh { server_id, forced } => refresh(state, server_id, forced)
            .await
            .map(TransportResponse::Refreshed),
        TransportRequest::RefreshAll => {
            Ok(TransportResponse::RefreshedAll(refresh_all(state).await))
        }
    }
}

/// Server directory, memoized unless `refresh` is set.
pub async fn get_servers(
    state: &SharedState,
    refresh: bool,
) -> Result<Vec<ServerDescriptor>, ServiceError> {
    let servers = if refresh {
        state.directory().refresh().await?
    } else {
        state.directory().servers().await?
    };
    Ok(servers)
}

/// Budget of the shared rate limiter.
pub async fn get_rate_limit(state: &SharedState) -> RateLimitResponse {
    state.scheduler().rate_limit_status().await.into()
}

/// Cached snapshot of one server. A non-forced refresh is started in the
/// background and its outcome is pushed through the update stream.
pub async fn get_snapshot(
    state: &SharedState,
    server_id: Option<String>,
) -> Result<ServerSnapshot, ServiceError> {
    let server_id = resolve_server_id(state, server_id).await?;
    let snapshot = state.scheduler().cache().get(&server_id);
    spawn_refresh(state, &server_id);
    Ok(ServerSnapshot {
        server_id,
        snapshot,
    })
}

/// Cached snapshots of every known server. Only servers whose cached record
/// cannot be advanced locally get a background refresh.
pub async fn get_all(state: &SharedState) -> IndexMap<String, NamedSnapshot> {
    load_directory(state).await;

    let now = state.scheduler().clock().now_secs();
    let mut all = IndexMap::new();
    for server_id in state.known_server_ids().await {
        let snapshot = state.scheduler().cache().get(&server_id);
        if prediction::requires_live_query(snapshot.data.as_ref(), now) {
            spawn_refresh(state, &server_id);
        }
        let name = state.directory().name_of(&server_id).await;
        all.insert(server_id, NamedSnapshot { name, snapshot });
    }
    all
}

/// Refresh one server and wait for the result.
pub async fn refresh(
    state: &SharedState,
    server_id: Option<String>,
    forced: bool,
) -> Result<ServerSnapshot, ServiceError> {
    let server_id = resolve_server_id(state, server_id).await?;
    let snapshot = state.scheduler().request_snapshot(&server_id, forced).await;
    Ok(ServerSnapshot {
        server_id,
        snapshot,
    })
}

/// Force a refresh of every known server concurrently.
pub async fn refresh_all(state: &SharedState) -> IndexMap<String, Snapshot> {
    load_directory(state).await;

    let ids = state.known_server_ids().await;
    let scheduler = state.scheduler();
    let snapshots = join_all(ids.iter().map(|id| scheduler.request_snapshot(id, true))).await;
    ids.into_iter().zip(snapshots).collect()
}

/// Explicit id, or the first server of the directory, or the first cached one.
///
/// An explicit id must be listed by the directory. When the directory cannot
/// be loaded, only ids already cached are accepted.
async fn resolve_server_id(
    state: &SharedState,
    server_id: Option<String>,
) -> Result<String, ServiceError> {
    let directory = state.directory().servers().await;

    let Some(id) = server_id else {
        if let Err(err) = &directory {
            warn!(error = %err, "failed to load server directory");
        }
        return state
            .known_server_ids()
            .await
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound("no server known yet".into()));
    };

    match directory {
        Ok(servers) if servers.iter().any(|server| server.id == id) => Ok(id),
        Ok(_) => Err(ServiceError::NotFound(format!("unknown server '{id}'"))),
        Err(_) if state.scheduler().cache().contains(&id) => Ok(id),
        Err(err) => Err(err.into()),
    }
}

/// Populate the directory when possible; a failure leaves the cached ids usable.
async fn load_directory(state: &SharedState) {
    if let Err(err) = state.directory().servers().await {
        warn!(error = %err, "failed to load server directory");
    }
}

fn spawn_refresh(state: &SharedState, server_id: &str) {
    let scheduler = state.scheduler().clone();
    let server_id = server_id.to_string();
    tokio::spawn(async move {
        scheduler.request_snapshot(&server_id, false).await;
    });
}
