// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Health protocol endpoints
//!
//! Answered from the readiness gate alone; never queued behind embeds.

use axum::extract::rejection::JsonRejection;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::http_server::AppState;
use crate::api::ApiError;
use crate::service::{HealthReport, ServingStatus};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Service to probe; empty means the whole server
    #[serde(default)]
    pub service: String,
}

/// POST /v1/health - status of a named service
///
/// Always 200; the status is in the body, including `SERVICE_UNKNOWN`.
pub async fn health_check_handler(
    State(state): State<AppState>,
    payload: Result<Json<HealthCheckRequest>, JsonRejection>,
) -> Result<Json<HealthReport>, ApiError> {
    let Json(request) = payload.map_err(ApiError::from)?;
    Ok(Json(state.service.health_check(&request.service)))
}

/// GET /health - whole-server probe for load balancers
///
/// 200 when serving, 503 otherwise.
pub async fn health_probe_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthReport>) {
    let report = state.service.health_check("");
    let status = match report.status {
        ServingStatus::Serving => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}
