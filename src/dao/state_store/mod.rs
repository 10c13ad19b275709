#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod file;
pub mod memory;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{dao::storage::StorageResult, state::cache::Snapshot};

/// Namespace prepended to server ids to build store keys.
pub const STATE_KEY_PREFIX: &str = "event_state_";

/// Last successful observation of a server, as written after a network fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub data: Snapshot,
    /// Epoch milliseconds when the fetch completed.
    pub saved_at: i64,
}

/// Abstraction over the durable store seeding prediction across restarts.
pub trait StateStore: Send + Sync {
    fn load(&self, server_id: &str) -> BoxFuture<'static, StorageResult<Option<PersistedState>>>;
    fn save(&self, server_id: &str, state: PersistedState) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Namespaced key under which a server's state is stored.
pub fn state_key(server_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{server_id}")
}
