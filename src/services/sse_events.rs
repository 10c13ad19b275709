use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{InfoMessage, ServerEvent},
    state::{SharedState, cache::SnapshotUpdate},
};

const EVENT_UPDATE: &str = "update";
const EVENT_INFO: &str = "info";

/// Encode a cache change as an `update` event.
pub fn update_event(update: &SnapshotUpdate) -> Option<ServerEvent> {
    encode(EVENT_UPDATE, update)
}

/// Greeting sent to a client right after it subscribes.
pub fn info_event(state: &SharedState) -> Option<ServerEvent> {
    let payload = InfoMessage {
        message: "update stream connected".into(),
        degraded: state.is_degraded(),
        servers: state.scheduler().cache().server_ids().len(),
    };
    encode(EVENT_INFO, &payload)
}

/// Current cache content as `update` events, so a new client does not wait
/// for the next change to render something.
pub fn replay_events(state: &SharedState) -> Vec<ServerEvent> {
    state
        .scheduler()
        .cache()
        .snapshots()
        .into_iter()
        .filter_map(|(server_id, snapshot)| {
            update_event(&SnapshotUpdate {
                server_id,
                snapshot,
            })
        })
        .collect()
}

fn encode(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}
