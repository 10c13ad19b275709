//! Event Watch Back binary entrypoint wiring the scheduler, the state store, REST and SSE layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_watch_back::{
    config::AppConfig,
    dao::{
        event_api::HttpEventSource,
        state_store::{StateStore, file::FileStateStore},
        storage::StorageError,
    },
    routes,
    services::{poller, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let source = HttpEventSource::new(&config.api_base_url, config.request_timeout)
        .context("building event API client")?;
    info!(api = %config.api_base_url, "event API client ready");

    let app_state = AppState::new(config, Arc::new(source));

    spawn_storage_supervisor(app_state.clone());
    tokio::spawn(poller::run(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    app_state.scheduler().shutdown();
    Ok(())
}

/// Start the supervisor of the configured state store: CouchDB when
/// `COUCH_BASE_URL` is set, JSON files under `state_dir` otherwise.
fn spawn_storage_supervisor(state: SharedState) {
    #[cfg(feature = "couch-store")]
    if env::var_os("COUCH_BASE_URL").is_some() {
        use event_watch_back::dao::state_store::couchdb::{CouchConfig, CouchStateStore};

        info!("using CouchDB state store");
        tokio::spawn(storage_supervisor::run(state, || async {
            let config = CouchConfig::from_env()?;
            let store = CouchStateStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn StateStore>)
        }));
        return;
    }

    let dir = state.config().state_dir.clone();
    info!(dir = %dir.display(), "using file state store");
    tokio::spawn(storage_supervisor::run(state, move || {
        let dir = dir.clone();
        async move {
            let store = FileStateStore::open(dir).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn StateStore>)
        }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
