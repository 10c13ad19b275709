mod common;

use std::time::Duration;

use event_watch_back::{
    dao::{
        event_api::MAX_RETRY_AFTER,
        state_store::{PersistedState, StateStore},
    },
    services::scheduler::ServerState,
    state::{
        cache::Snapshot,
        event::{EventRecord, OpenEvent},
    },
};
use tokio::time::sleep;

use common::{Harness, NOW_MS, NOW_SECS, Reply, ScriptedSource, announced, closed_soon};

async fn persist(harness: &Harness, server_id: &str, record: EventRecord, saved_at: i64) {
    let state = PersistedState {
        data: Snapshot {
            data: Some(record),
            error: None,
            loading: false,
            last_updated: saved_at,
        },
        saved_at,
    };
    harness.store.save(server_id, state).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_fetch() {
    let source = ScriptedSource::new([]).with_delay(Duration::from_millis(100));
    let harness = Harness::new(source).await;

    let (first, second) = tokio::join!(
        harness.scheduler.request_snapshot("eu-1", false),
        harness.scheduler.request_snapshot("eu-1", false),
    );

    assert_eq!(harness.source.event_calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.data, Some(closed_soon()));
    assert_eq!(harness.scheduler.server_state("eu-1"), ServerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn forced_request_does_not_join_in_flight_fetch() {
    let source = ScriptedSource::new([]).with_delay(Duration::from_millis(100));
    let harness = Harness::new(source).await;

    tokio::join!(
        harness.scheduler.request_snapshot("eu-1", false),
        harness.scheduler.request_snapshot("eu-1", true),
    );

    assert_eq!(harness.source.event_calls(), 2);
    assert_eq!(harness.scheduler.server_state("eu-1"), ServerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn missing_persisted_state_goes_to_network_and_persists() {
    let record = announced("Raid", NOW_SECS + 120);
    let harness = Harness::new(ScriptedSource::new([Reply::Record(record.clone())])).await;

    let snapshot = harness.scheduler.request_snapshot("eu-1", false).await;

    assert_eq!(harness.source.event_calls(), 1);
    assert_eq!(snapshot.data, Some(record.clone()));
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.loading);
    assert_eq!(snapshot.last_updated, NOW_MS);

    let persisted = harness.store.load("eu-1").await.unwrap().unwrap();
    assert_eq!(persisted.saved_at, NOW_MS);
    assert_eq!(persisted.data.data, Some(record));
}

#[tokio::test(start_paused = true)]
async fn valid_prediction_skips_the_network() {
    let harness = Harness::new(ScriptedSource::new([])).await;
    let saved_at = NOW_MS - 60_000;
    persist(&harness, "eu-1", announced("Raid", NOW_SECS - 10), saved_at).await;

    let snapshot = harness.scheduler.request_snapshot("eu-1", false).await;

    assert_eq!(harness.source.event_calls(), 0);
    assert_eq!(
        snapshot.data,
        Some(EventRecord::Open {
            event: OpenEvent {
                name: "Raid".into(),
                open_time: NOW_SECS - 10,
                close_time: NOW_SECS - 10 + 900,
            },
        })
    );
    assert_eq!(snapshot.last_updated, saved_at);
    assert_eq!(harness.scheduler.cache().get("eu-1"), snapshot);
}

#[tokio::test(start_paused = true)]
async fn forced_request_bypasses_prediction() {
    let harness = Harness::new(ScriptedSource::new([])).await;
    persist(&harness, "eu-1", announced("Raid", NOW_SECS - 10), NOW_MS - 60_000).await;

    let snapshot = harness.scheduler.request_snapshot("eu-1", true).await;

    assert_eq!(harness.source.event_calls(), 1);
    assert_eq!(snapshot.data, Some(closed_soon()));
    assert_eq!(snapshot.last_updated, NOW_MS);
}

#[tokio::test(start_paused = true)]
async fn upcoming_opening_requires_a_query() {
    let harness = Harness::new(ScriptedSource::new([])).await;
    let record = EventRecord::Closed {
        predicted_open_time: Some(NOW_SECS + 100),
    };
    persist(&harness, "eu-1", record, NOW_MS - 60_000).await;

    harness.scheduler.request_snapshot("eu-1", false).await;

    assert_eq!(harness.source.event_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_rate_limit_schedules_exactly_one_retry() {
    let fresh = announced("Raid", NOW_SECS + 120);
    let source = ScriptedSource::new([
        Reply::Record(closed_soon()),
        Reply::RateLimited(Duration::from_secs(5)),
        Reply::RateLimited(Duration::from_secs(30)),
        Reply::Record(fresh.clone()),
    ]);
    let harness = Harness::new(source).await;
    let scheduler = &harness.scheduler;

    scheduler.request_snapshot("eu-1", true).await;
    let limited = scheduler.request_snapshot("eu-1", true).await;

    assert_eq!(limited.data, Some(closed_soon()));
    assert_eq!(limited.error.as_deref(), Some("slow down"));
    assert!(!limited.loading);

    let pending = scheduler.pending_retry("eu-1").unwrap();
    assert!(pending > Duration::from_millis(4_900) && pending <= Duration::from_secs(5));
    assert!(matches!(
        scheduler.server_state("eu-1"),
        ServerState::RateLimited { .. }
    ));

    // A second 429 leaves the pending timer alone.
    scheduler.request_snapshot("eu-1", true).await;
    let pending = scheduler.pending_retry("eu-1").unwrap();
    assert!(pending <= Duration::from_secs(5));
    assert_eq!(harness.source.event_calls(), 3);

    sleep(Duration::from_millis(4_900)).await;
    assert_eq!(harness.source.event_calls(), 3);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.source.event_calls(), 4);
    assert_eq!(scheduler.cache().get("eu-1").data, Some(fresh));
    assert_eq!(scheduler.pending_retry("eu-1"), None);
}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_defers_without_touching_data() {
    let harness = Harness::new(ScriptedSource::new([])).await;
    let scheduler = &harness.scheduler;

    for _ in 0..10 {
        scheduler.request_snapshot("eu-1", true).await;
    }
    assert_eq!(harness.source.event_calls(), 10);
    assert_eq!(scheduler.rate_limit_status().await.available, 0);

    let before = scheduler.cache().get("eu-1");
    let deferred = scheduler.request_snapshot("eu-1", false).await;

    assert_eq!(harness.source.event_calls(), 10);
    assert_eq!(deferred.data, before.data);
    assert_eq!(deferred.last_updated, before.last_updated);
    assert!(!deferred.loading);

    let pending = scheduler.pending_retry("eu-1").unwrap();
    assert!(pending >= Duration::from_millis(200));

    // Denied again: still a single timer with the same deadline.
    scheduler.request_snapshot("eu-1", false).await;
    assert_eq!(scheduler.pending_retry("eu-1"), Some(pending));

    // The window only frees the oldest slot strictly after it elapsed, so the
    // first retry is denied once more and re-armed with the minimum delay.
    sleep(pending + Duration::from_millis(500)).await;
    assert_eq!(harness.source.event_calls(), 11);
    assert_eq!(scheduler.pending_retry("eu-1"), None);
}

#[tokio::test(start_paused = true)]
async fn forced_requests_are_never_denied() {
    let harness = Harness::new(ScriptedSource::new([])).await;

    for _ in 0..12 {
        harness.scheduler.request_snapshot("eu-1", true).await;
    }

    assert_eq!(harness.source.event_calls(), 12);
    assert_eq!(harness.scheduler.rate_limit_status().await.used, 12);
}

#[tokio::test(start_paused = true)]
async fn server_error_keeps_stale_data_without_retry() {
    let first = closed_soon();
    let source = ScriptedSource::new([Reply::Record(first.clone()), Reply::Status(500)]);
    let harness = Harness::new(source).await;

    harness.scheduler.request_snapshot("eu-1", true).await;
    let failed = harness.scheduler.request_snapshot("eu-1", true).await;

    assert_eq!(failed.data, Some(first));
    assert!(failed.error.is_some());
    assert!(!failed.loading);
    assert_eq!(harness.scheduler.pending_retry("eu-1"), None);
    assert_eq!(harness.scheduler.server_state("eu-1"), ServerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn degraded_mode_fetches_without_persisting() {
    let harness = Harness::without_store(ScriptedSource::new([]));

    harness.scheduler.request_snapshot("eu-1", false).await;
    harness.scheduler.request_snapshot("eu-1", false).await;

    assert_eq!(harness.source.event_calls(), 2);
    assert!(harness.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_change_is_broadcast() {
    let harness = Harness::new(ScriptedSource::new([])).await;
    let mut updates = harness.scheduler.subscribe();

    harness.scheduler.request_snapshot("eu-1", true).await;

    let loading = updates.recv().await.unwrap();
    assert_eq!(loading.server_id, "eu-1");
    assert!(loading.snapshot.loading);

    let done = updates.recv().await.unwrap();
    assert!(!done.snapshot.loading);
    assert_eq!(done.snapshot.data, Some(closed_soon()));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_retries() {
    let source = ScriptedSource::new([Reply::RateLimited(Duration::from_secs(5))]);
    let harness = Harness::new(source).await;

    harness.scheduler.request_snapshot("eu-1", true).await;
    assert!(harness.scheduler.pending_retry("eu-1").is_some());

    harness.scheduler.shutdown();
    assert_eq!(harness.scheduler.pending_retry("eu-1"), None);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.source.event_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn oversized_retry_after_is_capped() {
    let source = ScriptedSource::new([Reply::RateLimited(Duration::from_secs(
        10_000_000_000_000_000_000,
    ))]);
    let harness = Harness::new(source).await;

    let limited = harness.scheduler.request_snapshot("eu-1", true).await;

    assert!(!limited.loading);
    assert_eq!(limited.error.as_deref(), Some("slow down"));
    assert!(!harness.scheduler.cache().get("eu-1").loading);

    let pending = harness.scheduler.pending_retry("eu-1").unwrap();
    assert!(pending <= MAX_RETRY_AFTER);

    sleep(MAX_RETRY_AFTER + Duration::from_millis(10)).await;
    assert_eq!(harness.source.event_calls(), 2);
    assert_eq!(harness.scheduler.pending_retry("eu-1"), None);
}
