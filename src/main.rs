mod config;
mod db;
mod models;
mod routes;
mod services;

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LockBackend};
use crate::db::{create_pool, run_migrations};
use crate::services::{
    catalog::XtreamCatalogClient,
    guide_cache::PgGuideCacheStore,
    job_runner::JobRunner,
    redis::RedisService,
    registry::PgPlaylistRegistry,
    run_lock::{MemoryRunLockManager, RedisRunLockManager, RunLockManager},
    run_state::PgRunStateStore,
    scheduler::Scheduler,
};
use sqlx::PgPool;

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    /// Present when run locks live in Redis
    pub redis: Option<RedisService>,
    pub scheduler: Arc<Scheduler>,
    pub start_time: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guide_sync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting Guide Sync Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app_env);

    let pool = create_pool(&config)
        .await
        .context("failed to connect to PostgreSQL")?;
    tracing::info!("PostgreSQL connected");

    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("Database migrations completed");

    let (locks, redis): (Arc<dyn RunLockManager>, Option<RedisService>) = match config.lock_backend {
        LockBackend::Redis => {
            let redis = RedisService::new(&config.redis_url)
                .await
                .context("failed to connect to Redis")?;
            tracing::info!("Redis connected: {}", config.redis_url);
            let locks: Arc<dyn RunLockManager> =
                Arc::new(RedisRunLockManager::new(redis.clone(), config.lock_stale_after()));
            (locks, Some(redis))
        }
        LockBackend::Memory => {
            tracing::warn!("Using in-process run locks; do not run more than one instance");
            let locks: Arc<dyn RunLockManager> =
                Arc::new(MemoryRunLockManager::new(config.lock_stale_after()));
            (locks, None)
        }
    };

    let registry = Arc::new(PgPlaylistRegistry::new(pool.clone()));
    let run_states = Arc::new(PgRunStateStore::new(pool.clone()));
    let guide_cache = Arc::new(PgGuideCacheStore::new(pool.clone()));
    let catalog = Arc::new(
        XtreamCatalogClient::new(config.fetch_timeout(), &config.user_agent)
            .context("failed to build provider HTTP client")?,
    );

    let shutdown = CancellationToken::new();

    let runner = Arc::new(JobRunner::new(
        registry.clone(),
        catalog,
        locks,
        run_states.clone(),
        guide_cache.clone(),
        shutdown.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        runner,
        registry,
        run_states,
        guide_cache,
        config.scheduler_tick(),
    ));

    let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown.clone()));

    let state = Arc::new(AppState {
        config,
        pool,
        redis,
        scheduler,
        start_time: Instant::now(),
    });

    let app = Router::new()
        // Health endpoints
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/ready", get(routes::health::ready))
        .route("/live", get(routes::health::live))
        // Auto-update endpoints
        .route("/api/playlists/:id/run", post(routes::playlists::run_now))
        .route(
            "/api/playlists/:id/refresh-cache",
            post(routes::playlists::refresh_cache),
        )
        .route(
            "/api/playlists/:id/status",
            get(routes::playlists::get_status),
        )
        .route(
            "/api/playlists/:id/guide",
            get(routes::playlists::get_guide),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // In-flight updates see the cancelled token and record their failure
    shutdown.cancel();
    if let Err(e) = scheduler_task.await {
        tracing::error!("Scheduler task failed: {}", e);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolve on ctrl-c or SIGTERM, cancelling `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
