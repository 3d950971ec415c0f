use std::{net::SocketAddr, sync::Arc};

use secrecy::ExposeSecret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parksub::api::{build_router, AppState};
use parksub::config::Config;
use parksub::db;
use parksub::registry::PgRegistry;
use parksub::services::HttpDocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parksub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting parksub server...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Create database pool
    let pool = db::create_pool(
        config.database_url.expose_secret(),
        config.database_max_connections,
    )
    .await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let store = HttpDocumentStore::new(
        &config.document_store_url,
        config.document_store_token.clone(),
        config.probe_timeout(),
    )?;
    tracing::info!(url = %config.document_store_url, "Document store client initialized");

    // Build application state
    let state = AppState::new(
        Arc::new(PgRegistry::new(pool)),
        Arc::new(store),
        config.probe_retries,
    );

    let app = build_router(state);

    let host: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((host, config.port));
    tracing::info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cleaning up...");
}
