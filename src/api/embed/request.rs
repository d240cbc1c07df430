// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! EmbedRequest type for POST /v1/embed
//!
//! Carries one base64-encoded nose image and an optional crop override.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::service::EmbeddingRequest;
use crate::vision::format_from_hint;

/// Request body for POST /v1/embed
///
/// # Example
/// ```json
/// {
///   "imageData": "iVBORw0KGgo...",
///   "imageFormat": "png",
///   "crop": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedRequest {
    /// Base64-encoded image bytes; a `data:` URL prefix is accepted
    #[serde(default)]
    pub image_data: Option<String>,

    /// Format hint (png, jpg, webp, ...). Informational; the format is
    /// detected from the bytes.
    #[serde(default)]
    pub image_format: Option<String>,

    /// Overrides ENABLE_CENTER_CROP for this request
    #[serde(default)]
    pub crop: Option<bool>,
}

impl EmbedRequest {
    /// Validate the request and decode the image payload
    ///
    /// # Errors
    /// `ApiError::ValidationError` naming the offending field.
    pub fn into_embedding_request(self) -> Result<EmbeddingRequest, ApiError> {
        let data = self
            .image_data
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::ValidationError {
                field: "imageData".to_string(),
                message: "imageData is required".to_string(),
            })?;

        if let Some(ref hint) = self.image_format {
            if format_from_hint(hint).is_none() {
                return Err(ApiError::ValidationError {
                    field: "imageFormat".to_string(),
                    message: format!("unsupported image format '{}'", hint),
                });
            }
        }

        let image_bytes = decode_base64(data)?;

        Ok(EmbeddingRequest {
            image_bytes,
            crop: self.crop,
        })
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>, ApiError> {
    // data:image/png;base64,<payload>
    let payload = match data.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => data,
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ApiError::ValidationError {
            field: "imageData".to_string(),
            message: format!("imageData is not valid base64: {}", e),
        })
}
