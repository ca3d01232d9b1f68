use std::net::SocketAddr;
use std::sync::Arc;

use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use tokio::signal;

use shield_service::{
    build_router,
    config::ShieldConfig,
    services::{
        ApiTokenService, JwtService, SecurityEventService, SessionService, Shield, SystemClock,
    },
    stores::{self, InMemoryFailureBuckets, PostgresStores},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = ShieldConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting shield service"
    );

    let pool = stores::create_pool(&config.database)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    stores::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    tracing::info!("Database initialized successfully");

    let stores = Arc::new(PostgresStores::new(pool));
    let clock = Arc::new(SystemClock);
    let buckets = Arc::new(InMemoryFailureBuckets::new());

    let jwt = JwtService::new(&config.jwt)
        .map_err(service_core::error::AppError::ConfigError)?;
    tracing::info!("JWT service initialized");

    let shield = Shield::new(
        buckets,
        stores.clone(),
        stores.clone(),
        clock.clone(),
        config.detector.clone(),
    );
    let sessions = SessionService::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        jwt,
        shield.clone(),
        clock.clone(),
        config.session.refresh_token_expiry_days,
    );
    let api_tokens = ApiTokenService::new(stores.clone(), stores.clone(), clock.clone());
    let security_events = SecurityEventService::new(stores.clone(), clock.clone());

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login and Global IP");

    let state = AppState {
        config: config.clone(),
        sessions,
        api_tokens,
        shield,
        security_events,
        activity: stores.clone(),
        health: stores,
        login_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
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
