use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    state_store::{PersistedState, StateStore, state_key},
    storage::StorageResult,
};

/// Volatile store, used in tests and when no durable backend is configured.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<DashMap<String, PersistedState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored servers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, server_id: &str) -> BoxFuture<'static, StorageResult<Option<PersistedState>>> {
        let found = self
            .entries
            .get(&state_key(server_id))
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn save(&self, server_id: &str, state: PersistedState) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.insert(state_key(server_id), state);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
