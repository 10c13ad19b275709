use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use utoipa::ToSchema;

use crate::state::{event::EventRecord, sse::UpdateHub};

/// Cached view of one server: last known event plus request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Snapshot {
    /// Last known event record, if any fetch or prediction succeeded.
    pub data: Option<EventRecord>,
    /// Transient error of the latest attempt.
    pub error: Option<String>,
    /// True while a network call is running.
    pub loading: bool,
    /// Epoch milliseconds of the observation backing `data`.
    pub last_updated: i64,
}

/// Change notification emitted by [`CacheManager::set`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SnapshotUpdate {
    pub server_id: String,
    pub snapshot: Snapshot,
}

/// In-memory map of server id to its current [`Snapshot`].
///
/// Entries are only ever replaced whole so listeners never see a half-applied
/// change.
pub struct CacheManager {
    entries: DashMap<String, Snapshot>,
    hub: UpdateHub,
}

impl CacheManager {
    /// Create an empty cache whose update channel buffers `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            hub: UpdateHub::new(capacity),
        }
    }

    /// Current snapshot of `server_id`, creating an empty one on first access.
    pub fn get(&self, server_id: &str) -> Snapshot {
        if let Some(entry) = self.entries.get(server_id) {
            return entry.value().clone();
        }

        self.entries
            .entry(server_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Replace the snapshot of `server_id` and notify listeners.
    pub fn set(&self, server_id: &str, snapshot: Snapshot) {
        self.entries.insert(server_id.to_string(), snapshot.clone());
        self.hub.broadcast(SnapshotUpdate {
            server_id: server_id.to_string(),
            snapshot,
        });
    }

    /// Whether `server_id` already has an entry. Never creates one.
    pub fn contains(&self, server_id: &str) -> bool {
        self.entries.contains_key(server_id)
    }

    /// Ids of every server seen so far.
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Every cached snapshot, sorted by server id.
    pub fn snapshots(&self) -> Vec<(String, Snapshot)> {
        let mut all: Vec<(String, Snapshot)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.hub.subscribe()
    }

    /// Number of connected listeners.
    pub fn listeners(&self) -> usize {
        self.hub.listeners()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_access_creates_empty_snapshot() {
        let cache = CacheManager::new(4);
        assert_eq!(cache.get("eu-1"), Snapshot::default());
        assert_eq!(cache.server_ids(), vec!["eu-1".to_string()]);
    }

    #[tokio::test]
    async fn set_replaces_and_notifies() {
        let cache = CacheManager::new(4);
        let mut updates = cache.subscribe();

        let snapshot = Snapshot {
            data: Some(EventRecord::Closed {
                predicted_open_time: Some(42),
            }),
            error: None,
            loading: false,
            last_updated: 1_000,
        };
        cache.set("eu-1", snapshot.clone());

        assert_eq!(cache.get("eu-1"), snapshot);
        let update = updates.recv().await.unwrap();
        assert_eq!(update.server_id, "eu-1");
        assert_eq!(update.snapshot, snapshot);
    }
}
