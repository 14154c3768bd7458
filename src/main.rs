//! peerpay - peer-to-peer balance transfer service
//!
//! Serves balance, transfer and history endpoints over HTTP. Callers are
//! identified by an upstream gateway through the X-Request-User-Id header.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peerpay::api::{self, AppState};
use peerpay::config::{Config, LogFormat, StorageBackend};
use peerpay::db;
use peerpay::identity::{PgDirectory, StaticDirectory};
use peerpay::store::{InMemoryStorage, PgStorage, Storage};

/// Initialize tracing/logging
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "peerpay=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Open store handles for the configured backend
async fn open_state(config: &Config) -> anyhow::Result<(AppState, Arc<dyn Storage>)> {
    let options = config.engine_options();

    match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;

            tracing::info!("Connecting to database...");
            let pool = db::connect(database_url, config.database_max_connections).await?;
            db::verify_connection(&pool).await?;

            if config.database_apply_schema {
                db::apply_schema(&pool).await?;
            }

            // Verify database schema
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }
            tracing::info!("Database connected successfully");

            let storage = PgStorage::new(pool.clone());
            let resolver = Arc::new(PgDirectory::new(pool));
            let state = AppState::new(storage.clone(), resolver, options);
            Ok((state, Arc::new(storage)))
        }
        StorageBackend::Memory => {
            if config.is_production() {
                tracing::warn!("In-memory storage selected in production; balances are not durable");
            }
            let storage = InMemoryStorage::new();
            let resolver = Arc::new(StaticDirectory::new());
            let state = AppState::new(storage.clone(), resolver, options);
            Ok((state, Arc::new(storage)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        backend = ?config.storage_backend,
        environment = %config.environment,
        "Starting peerpay server"
    );

    let (state, storage) = open_state(&config).await?;

    tracing::info!("Listening on http://{}", addr);

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    storage.close().await;
    tracing::info!("Storage closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
