//! HTTP server exposing the generation operations under `/api`.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::studio::MonumentService;

pub mod api;

use api::{generate_handler, health_handler};

/// Shared state for the handlers: the service that holds the API key.
#[derive(Debug)]
pub struct AppState<S> {
    service: Arc<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<S: MonumentService> AppState<S> {
    /// Wraps the service used by every request.
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Builds the `/api` router. `body_limit` caps request bodies in bytes.
pub fn create_router<S: MonumentService>(body_limit: usize) -> Router<AppState<S>> {
    Router::new()
        .route("/api/health", axum::routing::get(health_handler))
        .route("/api/generate", axum::routing::post(generate_handler::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Serves the API until interrupted.
pub async fn setup_server<S: MonumentService>(
    listen_addr: &str,
    port: NonZeroU16,
    service: S,
    body_limit: usize,
) -> Result<(), anyhow::Error> {
    let app = create_router(body_limit).with_state(AppState::new(service));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}
