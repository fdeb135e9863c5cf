use huddle_auth::{
    build_router,
    config::Config,
    services::{Database, JwtService},
    AppState,
};
use huddle_core::observability::logging::init_tracing;
use huddle_core::ratelimit::{MemoryRateCounter, RateCounter, RedisRateCounter};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), huddle_core::error::AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid. A missing crypto secret is
    // a startup error, never a per-request one.
    let config = Config::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    // Database pool + schema
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            huddle_core::error::AppError::ConfigError(anyhow::anyhow!(
                "Failed to connect to Postgres: {}",
                e
            ))
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        huddle_core::error::AppError::ConfigError(anyhow::anyhow!("Migration failed: {}", e))
    })?;
    let db = Database::new(pool);
    tracing::info!("Database initialized");

    // Rate-limit counter store is optional: when Redis is unreachable we
    // degrade to in-process counters instead of refusing to start.
    let rate_counter: Arc<dyn RateCounter> = match RedisRateCounter::connect(&config.redis.url)
        .await
    {
        Ok(counter) => {
            tracing::info!("Rate counter store connected");
            Arc::new(counter)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Rate counter store unavailable, using in-process counters");
            Arc::new(MemoryRateCounter::new())
        }
    };

    let jwt = JwtService::new(&config.jwt)?;

    let port = config.port;
    let state = AppState::build(config, db, jwt, rate_counter)?;
    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
