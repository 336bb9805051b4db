use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{enqueue_job, get_job, health, process_queued, receive_push},
    state::AppState,
};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Assemble the HTTP surface: push receiver at the root, job admin, the
/// synchronous drain, and liveness.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(receive_push))
        .route("/jobs", post(enqueue_job))
        .route("/jobs/{job_id}", get(get_job))
        .route("/process-queued", post(process_queued))
        .route("/health", get(health))
        .with_state(state)
        // Automatically decompress gzip/deflate/brotli request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Run the HTTP server until the shutdown signal fires. In-flight
/// requests finish gracefully.
pub async fn serve(
    state: AppState,
    address: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AnyError> {
    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "enrichd API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("HTTP server shutting down");
        })
        .await?;

    Ok(())
}
