//! TaleWeave Back binary entrypoint wiring the REST API and storage layers.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taleweave_back::{
    AppConfig, routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    spawn_storage(app_state.clone());

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

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

    Ok(())
}

/// Pick and install a storage backend. With `MONGO_URI` set a supervisor task
/// manages the MongoDB connection; otherwise the in-memory store serves
/// everything and games do not survive a restart.
fn spawn_storage(state: SharedState) {
    #[cfg(feature = "mongo-store")]
    if env::var("MONGO_URI").is_ok() {
        tokio::spawn(run_storage_supervisor(state));
        return;
    }

    tokio::spawn(async move {
        use taleweave_back::dao::game_store::memory::MemoryGameStore;

        warn!("MONGO_URI not set; using in-memory storage");
        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;
    });
}

/// Supervises the MongoDB connection by retrying in the background and
/// toggling degraded mode when connectivity changes.
#[cfg(feature = "mongo-store")]
async fn run_storage_supervisor(state: SharedState) {
    use taleweave_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};

    let initial_delay_ms = 1000;
    let mut delay = Duration::from_millis(initial_delay_ms);
    let max_delay = Duration::from_secs(10);

    loop {
        if let Some(store) = state.game_store().await {
            match store.health_check().await {
                Ok(()) => {
                    // Healthy connection: reset the retry backoff and avoid
                    // hammering the database with pings.
                    delay = Duration::from_millis(initial_delay_ms);
                    sleep(Duration::from_secs(5)).await;
                }
                Err(err) => {
                    // Existing connection failed: drop it, flip to degraded
                    // mode, and retry with exponential backoff.
                    warn!(error = %err, "storage ping failed; entering degraded mode");
                    state.clear_game_store().await;
                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
            continue;
        }

        let config = match MongoConfig::from_env().await {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "invalid MongoDB configuration");
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
                continue;
            }
        };

        match MongoGameStore::connect(config).await {
            Ok(store) => {
                // Fresh connection and indexes ready: install it and leave
                // degraded mode.
                info!("connected to MongoDB; leaving degraded mode");
                state.install_game_store(Arc::new(store)).await;
                delay = Duration::from_millis(initial_delay_ms);
            }
            Err(err) => {
                // Could not reach MongoDB at all: wait and retry with
                // exponential backoff.
                warn!(error = %err, "MongoDB connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
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
