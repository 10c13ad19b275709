//! Request and response shapes of the transport boundary shared by the RPC
//! route and the per-operation REST routes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::validate_server_id,
    state::{cache::Snapshot, event::ServerDescriptor, rate_limiter::RateLimitStatus},
};

/// Closed set of requests a presentation client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportRequest {
    /// List known servers; `refresh` drops the memoized directory first.
    GetServers {
        #[serde(default)]
        refresh: bool,
    },
    /// Current budget of the shared rate limiter.
    GetRateLimit,
    /// Cached snapshot of one server, refreshed in the background.
    Get {
        #[serde(default)]
        server_id: Option<String>,
    },
    /// Cached snapshots of every known server.
    GetAll,
    /// Refresh one server and wait for the outcome.
    Refresh {
        #[serde(default)]
        server_id: Option<String>,
        #[serde(default)]
        forced: bool,
    },
    /// Force a refresh of every known server and wait for all of them.
    RefreshAll,
}

impl TransportRequest {
    fn server_id(&self) -> Option<&str> {
        match self {
            TransportRequest::Get { server_id } | TransportRequest::Refresh { server_id, .. } => {
                server_id.as_deref()
            }
            _ => None,
        }
    }
}

impl Validate for TransportRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(id) = self.server_id() {
            if let Err(e) = validate_server_id(id) {
                errors.add("server_id", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Answer to a [`TransportRequest`], tagged with the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum TransportResponse {
    Servers(Vec<ServerDescriptor>),
    RateLimit(RateLimitResponse),
    Snapshot(ServerSnapshot),
    All(IndexMap<String, NamedSnapshot>),
    Refreshed(ServerSnapshot),
    RefreshedAll(IndexMap<String, Snapshot>),
}

/// Budget of the shared rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct RateLimitResponse {
    pub used: usize,
    pub max: usize,
    pub available: usize,
    /// Milliseconds until a slot frees up, zero when one is available.
    pub next_slot_ms: u64,
}

impl From<RateLimitStatus> for RateLimitResponse {
    fn from(status: RateLimitStatus) -> Self {
        Self {
            used: status.used,
            max: status.max,
            available: status.available,
            next_slot_ms: u64::try_from(status.next_slot.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Snapshot of a single server, with the id it was resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ServerSnapshot {
    pub server_id: String,
    pub snapshot: Snapshot,
}

/// Snapshot paired with the server display name, when the directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct NamedSnapshot {
    pub name: Option<String>,
    pub snapshot: Snapshot,
}

/// Query string of `GET /servers`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ServersQuery {
    /// Drop the memoized directory and fetch it again.
    #[serde(default)]
    pub refresh: bool,
}

/// Query string of `GET /snapshot`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct SnapshotQuery {
    /// Target server; defaults to the first known server.
    pub server_id: Option<String>,
}

/// Body of `POST /refresh`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Target server; defaults to the first known server.
    #[serde(default)]
    pub server_id: Option<String>,
    /// Bypass prediction and the local rate limit denial.
    #[serde(default)]
    pub forced: bool,
}
