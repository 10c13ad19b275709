use futures::future::join_all;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::state::SharedState;

/// Refresh every known server on the configured cadence.
///
/// The first tick fires immediately so snapshots are warm right after start-up.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let refreshed = poll_once(&state).await;
        debug!(refreshed, "poll tick done");
    }
}

/// One non-forced refresh round over every known server.
pub async fn poll_once(state: &SharedState) -> usize {
    if let Err(err) = state.directory().servers().await {
        warn!(error = %err, "failed to load server directory before polling");
    }

    let ids = state.known_server_ids().await;
    let scheduler = state.scheduler();
    join_all(ids.iter().map(|id| scheduler.request_snapshot(id, false))).await;
    ids.len()
}
