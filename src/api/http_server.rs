// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::embed::embed_handler;
use super::health::{health_check_handler, health_probe_handler};
use crate::config::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::service::EmbeddingService;

/// Allowance for JSON field names, a `data:` prefix and the format hint
const JSON_FRAMING_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EmbeddingService>,
    /// Largest decoded image accepted by /v1/embed
    pub max_image_bytes: usize,
}

impl AppState {
    pub fn new(service: Arc<EmbeddingService>) -> Self {
        Self {
            service,
            max_image_bytes: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Body size that fits a base64-encoded image of `max_image_bytes`
pub fn request_body_limit(max_image_bytes: usize) -> usize {
    max_image_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(JSON_FRAMING_BYTES)
}

/// Build the router
///
/// `max_image_bytes` caps the decoded image; the body limit is derived from it.
pub fn create_app(mut state: AppState, max_image_bytes: usize) -> Router {
    state.max_image_bytes = max_image_bytes;

    Router::new()
        // Whole-server probe
        .route("/health", get(health_probe_handler))
        // Named-service health protocol
        .route("/v1/health", post(health_check_handler))
        // Embedding endpoint
        .route("/v1/embed", post(embed_handler))
        .route("/version", get(version_handler))
        .layer(DefaultBodyLimit::max(request_body_limit(max_image_bytes)))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(crate::version::get_version_info())
}

/// Serve until `shutdown` is cancelled
///
/// In-flight requests get `grace` to finish once shutdown starts.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("API server listening on {}", addr);
    }

    let signal = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => result,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("Graceful shutdown exceeded {:?}; dropping remaining connections", grace);
            Ok(())
        }
    }
}
