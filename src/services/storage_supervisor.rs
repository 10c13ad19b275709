use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{state_store::StateStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect the state store and keep the shared state in degraded mode while it is unavailable.
///
/// While degraded the store is withdrawn from the scheduler, which keeps
/// fetching without prediction seeding or persistence.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn StateStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_state_store(store.clone()).await;
                info!("state store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                loop {
                    if store.health_check().await.is_ok() {
                        sleep(HEALTH_POLL_INTERVAL).await;
                        continue;
                    }

                    if reconnect(&state, store.as_ref()).await {
                        state.install_state_store(store.clone()).await;
                        sleep(HEALTH_POLL_INTERVAL).await;
                    } else {
                        warn!("exhausted state store reconnect attempts; staying in degraded mode");
                        break;
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "state store connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Retry `store` with backoff after a failed health check.
async fn reconnect(state: &SharedState, store: &dyn StateStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "state store reconnected after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "state store reconnect first attempt failed; entering degraded mode"
                    );
                    state.clear_state_store().await;
                } else {
                    warn!(attempt, error = %err, "state store reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            event_api::{EventSource, FetchError, FetchResult},
            state_store::{PersistedState, memory::MemoryStateStore},
            storage::StorageResult,
        },
        state::{
            AppState,
            event::{EventRecord, ServerDescriptor},
        },
    };

    struct OfflineSource;

    impl EventSource for OfflineSource {
        fn fetch_events(&self, _server_id: &str) -> BoxFuture<'static, FetchResult<EventRecord>> {
            Box::pin(async {
                Err(FetchError::InvalidRecord {
                    path: "events".into(),
                    reason: "offline",
                })
            })
        }

        fn fetch_servers(&self) -> BoxFuture<'static, FetchResult<Vec<ServerDescriptor>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    /// Store whose health checks and reconnects always fail.
    struct BrokenStore;

    impl StateStore for BrokenStore {
        fn load(&self, _: &str) -> BoxFuture<'static, StorageResult<Option<PersistedState>>> {
            Box::pin(async { Ok(None) })
        }

        fn save(&self, _: &str, _: PersistedState) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(offline("health check")) })
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(offline("reconnect")) })
        }
    }

    fn offline(operation: &str) -> StorageError {
        StorageError::unavailable(
            format!("{operation} failed"),
            std::io::Error::other("connection refused"),
        )
    }

    fn app_state() -> SharedState {
        AppState::new(AppConfig::default(), Arc::new(OfflineSource))
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_store_leaves_degraded_mode() {
        let state = app_state();
        assert!(state.is_degraded());
        let mut watcher = state.degraded_watcher();

        let connects = Arc::new(AtomicUsize::new(0));
        let counter = connects.clone();
        let task = tokio::spawn(run(state.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                Ok::<_, StorageError>(Arc::new(MemoryStateStore::new()) as Arc<dyn StateStore>)
            }
        }));

        sleep(Duration::from_millis(10)).await;
        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.scheduler().store().await.is_some());
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_store_is_withdrawn() {
        let state = app_state();
        let task = tokio::spawn(run(state.clone(), || async {
            Ok::<_, StorageError>(Arc::new(BrokenStore) as Arc<dyn StateStore>)
        }));

        sleep(Duration::from_millis(10)).await;
        assert!(state.is_degraded());
        assert!(state.scheduler().store().await.is_none());
        task.abort();
    }
}
