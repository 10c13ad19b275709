use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Event Watch Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::updates_stream,
        crate::routes::transport::rpc,
        crate::routes::transport::list_servers,
        crate::routes::transport::rate_limit,
        crate::routes::transport::snapshot,
        crate::routes::transport::snapshots,
        crate::routes::transport::refresh,
        crate::routes::transport::refresh_all,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::InfoMessage,
            crate::dto::transport::TransportRequest,
            crate::dto::transport::TransportResponse,
            crate::dto::transport::RateLimitResponse,
            crate::dto::transport::ServerSnapshot,
            crate::dto::transport::NamedSnapshot,
            crate::dto::transport::RefreshRequest,
            crate::state::cache::Snapshot,
            crate::state::cache::SnapshotUpdate,
            crate::state::event::EventRecord,
            crate::state::event::ServerDescriptor,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "transport", description = "Snapshot, directory and rate limit operations"),
    )
)]
pub struct ApiDoc;
