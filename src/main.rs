//! Festival back-end binary entrypoint wiring REST, SSE, the lifecycle scheduler and storage.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use festival_back::{
    config::AppConfig,
    dao::{
        festival_store::{FestivalStore, InMemoryFestivalStore},
        storage::StorageError,
    },
    routes,
    services::{
        collaborators::{LogNotifier, Notifier, WebhookNotifier},
        dedup_guard::EventDedupGuard,
        storage_supervisor,
    },
    state::{AppState, SharedState},
};

const STORE_ENV: &str = "FESTIVAL_STORE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let notifier: Arc<dyn Notifier> = match config.webhook_url.as_deref() {
        Some(url) => match WebhookNotifier::new(url, config.lifecycle.notify_timeout) {
            Ok(webhook) => {
                info!("posting festival notices to the configured webhook");
                Arc::new(webhook)
            }
            Err(err) => {
                error!(error = %err, "failed to build webhook client; festival notices are only logged");
                Arc::new(LogNotifier)
            }
        },
        None => {
            info!("no webhook configured; festival notices are only logged");
            Arc::new(LogNotifier)
        }
    };

    let app_state = AppState::builder(config).notifier(notifier).build();
    EventDedupGuard::spawn_sweeper(app_state.dedup(), app_state.clock().clone());

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

/// Start the storage supervisor for the backend selected by `FESTIVAL_STORE`.
fn spawn_storage(state: SharedState) {
    let backend = env::var(STORE_ENV).unwrap_or_else(|_| "mongo".into());
    match backend.as_str() {
        "memory" => spawn_memory_store(state),
        "mongo" => spawn_mongo_store(state),
        other => {
            warn!(backend = other, "unknown festival store; using the in-memory store");
            spawn_memory_store(state);
        }
    }
}

fn spawn_memory_store(state: SharedState) {
    info!("using the in-memory festival store");
    let store: Arc<dyn FestivalStore> = Arc::new(InMemoryFestivalStore::new());
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok::<_, StorageError>(store) }
    }));
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo_store(state: SharedState) {
    use festival_back::dao::festival_store::mongodb::{MongoConfig, MongoFestivalStore};

    tokio::spawn(storage_supervisor::run(state, || async {
        let config = MongoConfig::from_env().await?;
        let store = MongoFestivalStore::connect(config).await?;
        Ok::<_, StorageError>(Arc::new(store) as Arc<dyn FestivalStore>)
    }));
}

#[cfg(not(feature = "mongo-store"))]
fn spawn_mongo_store(state: SharedState) {
    warn!("built without `mongo-store`; falling back to the in-memory festival store");
    spawn_memory_store(state);
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
