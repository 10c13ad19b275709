//! Shared test infrastructure for event-watch-back integration tests.
//!
//! Import from integration test files with:
//! ```ignore
//! mod common;
//! use common::{Reply, ScriptedSource};
//! ```

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use event_watch_back::{
    dao::{
        event_api::{EventSource, FetchError, FetchResult},
        state_store::memory::MemoryStateStore,
    },
    services::scheduler::{FetchScheduler, SchedulerConfig},
    state::{
        clock::ManualClock,
        event::{AnnouncedEvent, EventRecord, ServerDescriptor},
    },
};
use futures::future::BoxFuture;
use reqwest::StatusCode;

/// Wall clock start of every scenario, in epoch milliseconds.
pub const NOW_MS: i64 = 1_700_000_000_000;
/// Same instant in epoch seconds.
pub const NOW_SECS: i64 = NOW_MS / 1_000;

/// Scripted answer of one `fetch_events` call.
#[derive(Debug, Clone)]
pub enum Reply {
    Record(EventRecord),
    RateLimited(Duration),
    Status(u16),
}

/// [`EventSource`] replaying a queue of replies and counting calls.
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    fallback: EventRecord,
    delay: Duration,
    servers: Vec<ServerDescriptor>,
    directory_down: bool,
    event_calls: AtomicUsize,
    server_calls: AtomicUsize,
}

impl ScriptedSource {
    /// Source answering with `replies` in order, then with [`closed_soon`].
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            fallback: closed_soon(),
            delay: Duration::ZERO,
            servers: Vec::new(),
            directory_down: false,
            event_calls: AtomicUsize::new(0),
            server_calls: AtomicUsize::new(0),
        }
    }

    /// Every reply resolves only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer used once the scripted queue is empty.
    pub fn with_fallback(mut self, record: EventRecord) -> Self {
        self.fallback = record;
        self
    }

    /// Directory returned by `fetch_servers`.
    pub fn with_servers(mut self, ids: &[&str]) -> Self {
        self.servers = ids
            .iter()
            .map(|id| ServerDescriptor {
                id: id.to_string(),
                name: format!("Server {id}"),
                active: true,
            })
            .collect();
        self
    }

    /// `fetch_servers` answers 503.
    pub fn with_directory_down(mut self) -> Self {
        self.directory_down = true;
        self
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn server_calls(&self) -> usize {
        self.server_calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        replies
            .pop_front()
            .unwrap_or_else(|| Reply::Record(self.fallback.clone()))
    }
}

impl EventSource for ScriptedSource {
    fn fetch_events(&self, _server_id: &str) -> BoxFuture<'static, FetchResult<EventRecord>> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Reply::Record(record) => Ok(record),
                Reply::RateLimited(retry_after) => Err(FetchError::RateLimited {
                    retry_after,
                    message: Some("slow down".into()),
                }),
                Reply::Status(code) => Err(FetchError::Status {
                    path: "events".into(),
                    status: StatusCode::from_u16(code).unwrap(),
                    message: None,
                }),
            }
        })
    }

    fn fetch_servers(&self) -> BoxFuture<'static, FetchResult<Vec<ServerDescriptor>>> {
        self.server_calls.fetch_add(1, Ordering::SeqCst);
        if self.directory_down {
            return Box::pin(async {
                Err(FetchError::Status {
                    path: "servers".into(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: None,
                })
            });
        }
        let servers = self.servers.clone();
        Box::pin(async move { Ok(servers) })
    }
}

/// Closed record whose next opening is close enough to require a live query.
pub fn closed_soon() -> EventRecord {
    EventRecord::Closed {
        predicted_open_time: Some(NOW_SECS + 60),
    }
}

/// Announced record opening at `open_time`.
pub fn announced(name: &str, open_time: i64) -> EventRecord {
    EventRecord::Announced {
        event: AnnouncedEvent {
            name: name.into(),
            open_time,
            close_time: None,
        },
    }
}

/// Scheduler wired to a scripted source, a manual clock and an in-memory store.
pub struct Harness {
    pub scheduler: FetchScheduler,
    pub source: Arc<ScriptedSource>,
    pub store: MemoryStateStore,
    pub clock: ManualClock,
}

impl Harness {
    /// Harness with a state store installed.
    pub async fn new(source: ScriptedSource) -> Self {
        let harness = Self::without_store(source);
        harness
            .scheduler
            .install_store(Arc::new(harness.store.clone()))
            .await;
        harness
    }

    /// Harness running as if the state store were unreachable.
    pub fn without_store(source: ScriptedSource) -> Self {
        let source = Arc::new(source);
        let clock = ManualClock::new(NOW_MS);
        let scheduler = FetchScheduler::new(
            SchedulerConfig::default(),
            source.clone(),
            Arc::new(clock.clone()),
        );
        Self {
            scheduler,
            source,
            store: MemoryStateStore::new(),
            clock,
        }
    }
}
