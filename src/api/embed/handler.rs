// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /v1/embed handler

use axum::extract::rejection::JsonRejection;
use axum::{extract::State, Json};
use tracing::{debug, warn};

use super::request::EmbedRequest;
use super::response::EmbedResponse;
use crate::api::http_server::AppState;
use crate::api::ApiError;

/// POST /v1/embed - Embed one nose image
///
/// # Errors
/// - 400 Bad Request: missing/invalid `imageData`, undecodable image
/// - 413 Payload Too Large: body or decoded image over the configured limit
/// - 503 Service Unavailable: model still loading or failed to load
/// - 500 Internal Server Error: inference failed
///
/// If the client disconnects, axum drops this future and the service
/// abandons the request.
pub async fn embed_handler(
    State(state): State<AppState>,
    payload: Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedResponse>, ApiError> {
    let Json(request) = payload.map_err(ApiError::from)?;

    if let Some(ref format) = request.image_format {
        debug!("Embed request with format hint {}", format);
    }

    let request = request.into_embedding_request().map_err(|e| {
        warn!("Embed validation failed: {}", e);
        e
    })?;

    if request.image_bytes.len() > state.max_image_bytes {
        warn!(
            "Embed image too large: {} bytes (max {})",
            request.image_bytes.len(),
            state.max_image_bytes
        );
        return Err(ApiError::PayloadTooLarge(format!(
            "image is {} bytes; maximum is {}",
            request.image_bytes.len(),
            state.max_image_bytes
        )));
    }

    let vector = state.service.embed(request).await?;
    Ok(Json(EmbedResponse::from(vector)))
}
