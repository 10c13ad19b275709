use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::{
    dao::event_api::{EventSource, FetchResult},
    state::event::ServerDescriptor,
};

/// Memoized list of servers published by the event API.
///
/// Fetched on first use and kept for the process lifetime unless
/// [`ServerDirectory::refresh`] is called.
pub struct ServerDirectory {
    source: Arc<dyn EventSource>,
    servers: RwLock<Option<Vec<ServerDescriptor>>>,
}

impl ServerDirectory {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            source,
            servers: RwLock::new(None),
        }
    }

    /// Known servers, fetching them once if needed.
    pub async fn servers(&self) -> FetchResult<Vec<ServerDescriptor>> {
        if let Some(servers) = self.cached().await {
            return Ok(servers);
        }

        let mut guard = self.servers.write().await;
        // Another caller may have filled the slot while we waited for the lock.
        if let Some(servers) = guard.as_ref() {
            return Ok(servers.clone());
        }

        let servers = self.source.fetch_servers().await?;
        info!(count = servers.len(), "loaded server directory");
        *guard = Some(servers.clone());
        Ok(servers)
    }

    /// Drop the memoized list and fetch it again.
    pub async fn refresh(&self) -> FetchResult<Vec<ServerDescriptor>> {
        let mut guard = self.servers.write().await;
        let servers = self.source.fetch_servers().await?;
        info!(count = servers.len(), "refreshed server directory");
        *guard = Some(servers.clone());
        Ok(servers)
    }

    /// Memoized list without triggering a fetch.
    pub async fn cached(&self) -> Option<Vec<ServerDescriptor>> {
        self.servers.read().await.clone()
    }

    /// Display name of `server_id`, if the directory knows it.
    pub async fn name_of(&self, server_id: &str) -> Option<String> {
        let guard = self.servers.read().await;
        guard
            .as_ref()?
            .iter()
            .find(|server| server.id == server_id)
            .map(|server| server.name.clone())
    }
}
