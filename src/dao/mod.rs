/// Client for the remote event API.
pub mod event_api;
/// Durable per-server record of the last observed API result.
pub mod state_store;
/// Storage error types shared by every state store backend.
pub mod storage;
