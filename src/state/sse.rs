use tokio::sync::broadcast;

use crate::state::cache::SnapshotUpdate;

/// Broadcast hub fanning snapshot changes out to every presentation client.
pub struct UpdateHub {
    sender: broadcast::Sender<SnapshotUpdate>,
}

impl UpdateHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.sender.subscribe()
    }

    /// Send an update to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, update: SnapshotUpdate) {
        let _ = self.sender.send(update);
    }

    /// Number of connected listeners.
    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}
