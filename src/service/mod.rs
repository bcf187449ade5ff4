//! OpenAI-compatible embedding HTTP service.
//!
//! Serves `/v1/models`, `/v1/embeddings` and `/health` over one shared,
//! pre-loaded [`Embedder`].
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::embedder::Embedder;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub embedder: Arc<dyn Embedder>,
    pub settings: Arc<EmbeddingConfig>,
}

impl AppState {
    pub fn new(embedder: Arc<dyn Embedder>, settings: EmbeddingConfig) -> Self {
        Self {
            embedder,
            settings: Arc::new(settings),
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/embeddings", post(handlers::create_embeddings))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn serve(addr: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Starting embedding service on http://{addr}");
    info!(
        "Model: {} ({} dims, device {})",
        state.embedder.model_name(),
        state.embedder.dimensions(),
        state.embedder.device()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("embedding service terminated with an error")?;

    info!("Embedding service stopped");
    Ok(())
}
