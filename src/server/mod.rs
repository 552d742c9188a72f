mod api;
mod error;
mod state;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

pub use self::state::*;

/// Room for multipart boundaries and headers on top of the two files.
const FORM_OVERHEAD: usize = 64 * 1024;

/// Build the API router
pub fn create_app(state: Arc<AppState>) -> Router {
    // a single oversized file still reaches validation; anything past the
    // transport limit is answered with the same JSON 400
    let max_upload = state.orchestrator.limits().max_upload_bytes;
    let body_limit = max_upload.saturating_mul(2).saturating_add(FORM_OVERHEAD);

    Router::new()
        .route("/detect", post(api::detect_handler))
        .route("/health", get(api::health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(middleware::map_response_with_state(
            max_upload,
            error::body_too_large,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = create_app(state);
    let listener = TcpListener::bind(addr).await?;
    info!("server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;
    Ok(())
}
