//! Linkcast server binary entrypoint.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use linkcast_common::config::AppConfig;
use linkcast_delivery::DeliveryEngine;
use linkcast_shortener::UrlStore;

use linkcast_api::routes::create_router;
use linkcast_api::state::AppState;

/// Largest accepted request body (bytes).
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let default_filter =
        "linkcast_api=debug,linkcast_delivery=debug,linkcast_shortener=debug,tower_http=debug";
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    tracing::info!("Starting Linkcast server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Start the delivery engine (retry scheduler + connection registry)
    let engine = DeliveryEngine::start(&config.delivery);
    tracing::info!(
        retry_interval_ms = config.delivery.retry_interval_ms,
        expiry_ms = config.delivery.expiry_ms,
        "Delivery engine running"
    );

    let store = Arc::new(UrlStore::new(config.shortener.clone()));

    // Build application state
    let state = AppState::new(engine.handle(), store, config.clone());

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!("Server running on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    let delivery = engine.handle();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C, shutting down");
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
            // Closes every push connection so the server can drain.
            let _ = delivery.close().await;
        })
        .await?;

    engine.shutdown().await;

    tracing::info!("Linkcast server stopped.");
    Ok(())
}
