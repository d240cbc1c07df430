// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Health protocol types

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::readiness::ReadinessState;

/// Service name health probes use for the embedding service
pub const SERVICE_NAME: &str = "nose_embedder.NoseEmbedderService";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServingStatus {
    Serving,
    NotServing,
    ServiceUnknown,
}

impl ServingStatus {
    /// Status of a known service in the given readiness state
    pub fn from_readiness(state: ReadinessState) -> Self {
        match state {
            ReadinessState::Ready => ServingStatus::Serving,
            ReadinessState::NotReady | ReadinessState::Failed => ServingStatus::NotServing,
        }
    }
}

/// Names accepted by the health protocol: the whole server (`""`) or the
/// embedding service
pub fn is_known_service(name: &str) -> bool {
    name.is_empty() || name == SERVICE_NAME
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: ServingStatus,
    pub message: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    pub timestamp: String,
}

impl HealthReport {
    pub fn new(
        status: ServingStatus,
        message: impl Into<String>,
        model_loaded: bool,
        dimension: Option<usize>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            model_loaded,
            dimension,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
