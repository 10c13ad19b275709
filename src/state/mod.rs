pub mod cache;
pub mod clock;
pub mod event;
pub mod prediction;
pub mod rate_limiter;
mod sse;

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    config::AppConfig,
    dao::{event_api::EventSource, state_store::StateStore},
    services::{
        directory::ServerDirectory,
        scheduler::{FetchScheduler, SchedulerConfig},
    },
    state::clock::{Clock, SystemClock},
};

pub use self::sse::UpdateHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the scheduler singleton, the server directory
/// and the degraded flag of the persistent store.
pub struct AppState {
    config: AppConfig,
    scheduler: FetchScheduler,
    directory: ServerDirectory,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a state store is installed.
    pub fn new(config: AppConfig, source: Arc<dyn EventSource>) -> SharedState {
        Self::with_clock(config, source, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit wall clock.
    pub fn with_clock(
        config: AppConfig,
        source: Arc<dyn EventSource>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let scheduler_config = SchedulerConfig {
            rate_window: config.rate_window,
            rate_max_requests: config.rate_max_requests,
            ..SchedulerConfig::default()
        };

        Arc::new(Self {
            scheduler: FetchScheduler::new(scheduler_config, source.clone(), clock),
            directory: ServerDirectory::new(source),
            config,
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The fetch scheduler singleton.
    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    /// Memoized server directory.
    pub fn directory(&self) -> &ServerDirectory {
        &self.directory
    }

    /// Install a state store and leave degraded mode.
    pub async fn install_state_store(&self, store: Arc<dyn StateStore>) {
        self.scheduler.install_store(store).await;
        self.update_degraded(false);
    }

    /// Remove the current state store and enter degraded mode.
    pub async fn clear_state_store(&self) {
        self.scheduler.clear_store().await;
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Every server id worth refreshing: the directory, then anything cached.
    pub async fn known_server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .directory
            .cached()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|server| server.id)
            .collect();

        for id in self.scheduler.cache().server_ids() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        ids
    }
}
