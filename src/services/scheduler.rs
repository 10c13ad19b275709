//! Decides when a server's event record is fetched from the network.
//!
//! Every request goes through the same ladder: join an in-flight fetch,
//! answer from a local prediction, back off when the shared rate budget is
//! spent, and only then call the API. Whatever happens, the outcome lands in
//! the [`CacheManager`] as a full snapshot.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use tokio::{
    sync::{Mutex, RwLock, broadcast},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        event_api::{EventSource, FetchError, MAX_RETRY_AFTER},
        state_store::{PersistedState, StateStore},
    },
    state::{
        cache::{CacheManager, Snapshot, SnapshotUpdate},
        clock::Clock,
        prediction::{needs_query, predict},
        rate_limiter::{
            DEFAULT_RATE_MAX_REQUESTS, DEFAULT_RATE_WINDOW, RateLimitStatus, RateLimiter,
        },
    },
};

/// Shortest delay before retrying after a local rate-limit denial.
pub const MIN_LOCAL_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Tunables of the [`FetchScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub rate_window: Duration,
    pub rate_max_requests: usize,
    pub min_retry_delay: Duration,
    /// Buffered snapshot updates per listener before it starts lagging.
    pub update_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_window: DEFAULT_RATE_WINDOW,
            rate_max_requests: DEFAULT_RATE_MAX_REQUESTS,
            min_retry_delay: MIN_LOCAL_RETRY_DELAY,
            update_capacity: 64,
        }
    }
}

/// Observable scheduling state of one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Fetching,
    RateLimited { retry_at: Instant },
}

type PendingSnapshot = Shared<BoxFuture<'static, Snapshot>>;

/// Marker of the fetch currently running for a server.
struct InFlight {
    token: Uuid,
    result: PendingSnapshot,
}

/// Single-shot retry owned by the scheduler; at most one per server.
struct RetryTimer {
    due: Instant,
    handle: JoinHandle<()>,
}

/// Everything the scheduler mutates, owned by one long-lived instance.
struct SchedulerState {
    cache: CacheManager,
    limiter: Mutex<RateLimiter>,
    in_flight: DashMap<String, InFlight>,
    retries: DashMap<String, RetryTimer>,
    store: RwLock<Option<Arc<dyn StateStore>>>,
    source: Arc<dyn EventSource>,
    clock: Arc<dyn Clock>,
    min_retry_delay: Duration,
}

/// Cheaply clonable handle to the scheduler.
#[derive(Clone)]
pub struct FetchScheduler {
    inner: Arc<SchedulerState>,
}

impl FetchScheduler {
    /// Build the scheduler. No state store is installed yet.
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn EventSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerState {
                cache: CacheManager::new(config.update_capacity),
                limiter: Mutex::new(RateLimiter::new(
                    config.rate_window,
                    config.rate_max_requests,
                )),
                in_flight: DashMap::new(),
                retries: DashMap::new(),
                store: RwLock::new(None),
                source,
                clock,
                min_retry_delay: config.min_retry_delay,
            }),
        }
    }

    /// Read access to the snapshot cache.
    pub fn cache(&self) -> &CacheManager {
        &self.inner.cache
    }

    /// Subscribe to every snapshot change.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.inner.cache.subscribe()
    }

    /// Wall clock used for predictions and timestamps.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Install the durable store used to seed predictions.
    pub async fn install_store(&self, store: Arc<dyn StateStore>) {
        let mut guard = self.inner.store.write().await;
        *guard = Some(store);
    }

    /// Remove the durable store; fetching continues without persistence.
    pub async fn clear_store(&self) {
        let mut guard = self.inner.store.write().await;
        guard.take();
    }

    /// Currently installed store, if any.
    pub async fn store(&self) -> Option<Arc<dyn StateStore>> {
        let guard = self.inner.store.read().await;
        guard.as_ref().cloned()
    }

    /// Budget of the shared rate limiter.
    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.inner.limiter.lock().await.status()
    }

    /// Scheduling state of `server_id`.
    pub fn server_state(&self, server_id: &str) -> ServerState {
        if self.inner.in_flight.contains_key(server_id) {
            return ServerState::Fetching;
        }
        match self.inner.retries.get(server_id) {
            Some(timer) if !timer.handle.is_finished() => {
                ServerState::RateLimited { retry_at: timer.due }
            }
            _ => ServerState::Idle,
        }
    }

    /// Remaining delay of the pending retry of `server_id`.
    pub fn pending_retry(&self, server_id: &str) -> Option<Duration> {
        let timer = self.inner.retries.get(server_id)?;
        if timer.handle.is_finished() {
            return None;
        }
        Some(timer.due.saturating_duration_since(Instant::now()))
    }

    /// Abort every pending retry timer.
    pub fn shutdown(&self) {
        self.inner.retries.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }

    /// Produce an up-to-date snapshot of `server_id`.
    ///
    /// Non-forced requests join a fetch already running for the same server,
    /// answer from the persisted state when the lifecycle can be replayed
    /// locally, and back off when the shared budget is spent. Forced requests
    /// always reach the network but still consume budget.
    pub async fn request_snapshot(&self, server_id: &str, forced: bool) -> Snapshot {
        let pending = match self.inner.in_flight.entry(server_id.to_string()) {
            Entry::Occupied(entry) if !forced => {
                debug!(server_id, "joining in-flight request");
                entry.get().result.clone()
            }
            Entry::Occupied(mut entry) => {
                let (token, result) = self.spawn_request(server_id, forced);
                entry.insert(InFlight {
                    token,
                    result: result.clone(),
                });
                result
            }
            Entry::Vacant(entry) => {
                let (token, result) = self.spawn_request(server_id, forced);
                entry.insert(InFlight {
                    token,
                    result: result.clone(),
                });
                result
            }
        };

        pending.await
    }

    /// Run the request in its own task so it completes even if every caller goes away.
    fn spawn_request(&self, server_id: &str, forced: bool) -> (Uuid, PendingSnapshot) {
        let token = Uuid::new_v4();
        let worker = self.clone();
        let id = server_id.to_string();
        let handle = tokio::spawn(async move {
            let snapshot = worker.run_request(&id, forced).await;
            worker.finish(&id, token);
            snapshot
        });

        let scheduler = self.clone();
        let id = server_id.to_string();
        let result = async move {
            match handle.await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    error!(server_id = %id, error = %err, "snapshot request task failed");
                    scheduler.finish(&id, token);
                    scheduler.inner.cache.get(&id)
                }
            }
        }
        .boxed()
        .shared();

        (token, result)
    }

    /// Clear the in-flight marker, unless a newer request already replaced it.
    fn finish(&self, server_id: &str, token: Uuid) {
        self.inner
            .in_flight
            .remove_if(server_id, |_, in_flight| in_flight.token == token);
    }

    async fn run_request(&self, server_id: &str, forced: bool) -> Snapshot {
        if !forced {
            if let Some(snapshot) = self.predicted_snapshot(server_id).await {
                debug!(
                    server_id,
                    state = snapshot.data.as_ref().map(|record| record.kind()),
                    "served snapshot from prediction"
                );
                self.inner.cache.set(server_id, snapshot.clone());
                return snapshot;
            }
        }

        if let Some(wait) = self.acquire_slot(forced).await {
            let snapshot = Snapshot {
                loading: false,
                ..self.inner.cache.get(server_id)
            };
            self.inner.cache.set(server_id, snapshot.clone());
            let delay = wait.max(self.inner.min_retry_delay);
            info!(server_id, ?delay, "local rate limit reached; deferring request");
            self.schedule_retry(server_id, delay);
            return snapshot;
        }

        self.fetch_from_network(server_id).await
    }

    /// Take a rate-limit slot. Returns the wait when a non-forced request is denied.
    async fn acquire_slot(&self, forced: bool) -> Option<Duration> {
        let mut limiter = self.inner.limiter.lock().await;
        if forced || limiter.can_proceed() {
            limiter.record();
            None
        } else {
            Some(limiter.time_until_slot())
        }
    }

    /// Snapshot replayed from the persisted observation, when no query is needed.
    async fn predicted_snapshot(&self, server_id: &str) -> Option<Snapshot> {
        let store = self.store().await?;
        let persisted = match store.load(server_id).await {
            Ok(persisted) => persisted?,
            Err(err) => {
                warn!(server_id, error = %err, "failed to load persisted state");
                return None;
            }
        };

        let observed = persisted.data.data.as_ref()?;
        let now = self.inner.clock.now_secs();
        let predicted = predict(observed, now);
        if needs_query(predicted.as_ref(), now) {
            return None;
        }

        Some(Snapshot {
            data: predicted,
            error: None,
            loading: false,
            last_updated: persisted.saved_at,
        })
    }

    async fn fetch_from_network(&self, server_id: &str) -> Snapshot {
        let loading = Snapshot {
            loading: true,
            error: None,
            ..self.inner.cache.get(server_id)
        };
        self.inner.cache.set(server_id, loading);

        let outcome = self.inner.source.fetch_events(server_id).await;
        let current = self.inner.cache.get(server_id);

        let snapshot = match outcome {
            Ok(record) => {
                let now_ms = self.inner.clock.now_ms();
                debug!(server_id, state = record.kind(), "fetched event record");
                let snapshot = Snapshot {
                    data: Some(record),
                    error: None,
                    loading: false,
                    last_updated: now_ms,
                };
                self.inner.cache.set(server_id, snapshot.clone());
                self.persist(server_id, &snapshot, now_ms).await;
                return snapshot;
            }
            Err(err @ FetchError::RateLimited { retry_after, .. }) => {
                warn!(server_id, ?retry_after, "event API rate limited the request");
                self.schedule_retry(server_id, retry_after);
                Snapshot {
                    error: Some(err.user_message()),
                    loading: false,
                    ..current
                }
            }
            Err(err) => {
                warn!(server_id, error = %err, "event fetch failed; keeping stale data");
                Snapshot {
                    error: Some(err.user_message()),
                    loading: false,
                    ..current
                }
            }
        };

        self.inner.cache.set(server_id, snapshot.clone());
        snapshot
    }

    async fn persist(&self, server_id: &str, snapshot: &Snapshot, saved_at: i64) {
        let Some(store) = self.store().await else {
            debug!(server_id, "no state store installed; skipping persistence");
            return;
        };

        let state = PersistedState {
            data: snapshot.clone(),
            saved_at,
        };
        if let Err(err) = store.save(server_id, state).await {
            warn!(server_id, error = %err, "failed to persist event state");
        }
    }

    /// Arm the retry timer of `server_id` unless one is already pending.
    fn schedule_retry(&self, server_id: &str, delay: Duration) {
        match self.inner.retries.entry(server_id.to_string()) {
            Entry::Occupied(entry) if !entry.get().handle.is_finished() => {
                debug!(server_id, "retry already pending");
            }
            entry => {
                let delay = delay.min(MAX_RETRY_AFTER);
                let now = Instant::now();
                let due = now.checked_add(delay).unwrap_or(now);
                let worker = self.clone();
                let id = server_id.to_string();
                let handle = tokio::spawn(async move {
                    sleep_until(due).await;
                    worker.inner.retries.remove(&id);
                    debug!(server_id = %id, "retry timer fired");
                    worker.request_snapshot(&id, false).await;
                });
                entry.insert(RetryTimer { due, handle });
            }
        }
    }
}
