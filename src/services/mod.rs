/// Memoized server directory.
pub mod directory;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Periodic refresh of every known server.
pub mod poller;
/// Fetch scheduling: coalescing, prediction, rate limiting and retries.
pub mod scheduler;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// State store supervision and degraded mode toggling.
pub mod storage_supervisor;
/// Transport boundary request handlers.
pub mod transport;
