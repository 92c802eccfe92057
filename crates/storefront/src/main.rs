//! Shelf storefront - digital-goods JSON API.
//!
//! This binary serves the storefront API on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out
//! - `PostgreSQL` (or in-memory maps for development) behind one storage trait
//! - Cookie sessions via tower-sessions
//! - Product archives on local disk, streamed to entitled users

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sentry::integrations::tracing as sentry_tracing;
use tower_sessions::{ExpiredDeletion, MemoryStore};
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelf_storefront::config::{StorageBackend, StorefrontConfig};
use shelf_storefront::db::{self, MemoryStorage, PgStorage, SharedStorage};
use shelf_storefront::state::AppState;
use shelf_storefront::build_router;

const EXPIRED_SESSION_SWEEP: Duration = Duration::from_secs(60);

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Structured logs on Fly.io, human-readable text elsewhere, with warnings
/// and errors forwarded to Sentry.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shelf_storefront=info,tower_http=debug".into());

    let is_fly = std::env::var("FLY_APP_NAME").is_ok();
    let json_layer = is_fly.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!is_fly).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

/// Open the configured backend and wire it into a router.
///
/// Migrations are not applied here; run `shelf-cli migrate` first.
async fn build_app(config: &StorefrontConfig) -> Router {
    match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_ref()
                .expect("Postgres storage requires STOREFRONT_DATABASE_URL");
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");
            tracing::info!("Database pool created");

            let state = prepare_state(config, Arc::new(PgStorage::new(pool.clone()))).await;
            let session_store = PostgresStore::new(pool);
            tokio::spawn(
                session_store
                    .clone()
                    .continuously_delete_expired(EXPIRED_SESSION_SWEEP),
            );
            build_router(state, session_store)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; all data is lost on restart");
            let state = prepare_state(config, Arc::new(MemoryStorage::new())).await;
            build_router(state, MemoryStore::default())
        }
    }
}

async fn prepare_state(config: &StorefrontConfig, storage: SharedStorage) -> AppState {
    let state = AppState::new(config.clone(), storage);
    state
        .files()
        .ensure_root()
        .await
        .expect("Failed to create upload directory");
    state
}

#[tokio::main]
async fn main() {
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Sentry before tracing so the tracing layer has a client to report to.
    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if config.trust_client_payments {
        tracing::warn!(
            "Client-confirmed payments are enabled; /orders and /mark-paid grant access without verification"
        );
    }
    if config.payment_webhook_secret.is_none() {
        tracing::warn!("No payment webhook secret configured; /webhooks/payment is disabled");
    }

    let app = build_app(&config).await;

    let addr = config.socket_addr();
    tracing::info!(%addr, storage = ?config.storage, "Shelf storefront listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
