// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding service: readiness gate, worker pool and health protocol

pub mod embedding_service;
pub mod health;
pub mod readiness;
pub mod runtime;
pub mod worker_pool;

use thiserror::Error;

use crate::embeddings::EngineError;
use crate::vision::ImageError;

pub use embedding_service::{EmbeddingRequest, EmbeddingService};
pub use health::{is_known_service, HealthReport, ServingStatus, SERVICE_NAME};
pub use readiness::{GateError, ReadinessGate, ReadinessState};
pub use runtime::ServingRuntime;
pub use worker_pool::{PoolError, WorkerPool};

/// Per-request failures. None of these change readiness.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_))
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Inference(_) | EngineError::ShapeMismatch { .. } => {
                ServiceError::Inference(err.to_string())
            }
            EngineError::ModelNotLoaded(_) => ServiceError::Internal(err.to_string()),
        }
    }
}
