// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request-facing embedding service
//!
//! Embeds go through the readiness gate and then the worker pool. Health
//! checks read the gate directly and never wait behind embedding work.

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::health::{is_known_service, HealthReport, ServingStatus};
use super::readiness::{ReadinessGate, ReadinessState};
use super::worker_pool::{PoolError, WorkerPool};
use super::ServiceError;
use crate::embeddings::EmbeddingVector;

/// One embedding call
#[derive(Debug, Clone)]
pub struct EmbeddingRequest {
    pub image_bytes: Vec<u8>,
    /// Overrides the configured crop mode when set
    pub crop: Option<bool>,
}

impl EmbeddingRequest {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            crop: None,
        }
    }

    pub fn with_crop(mut self, crop: bool) -> Self {
        self.crop = Some(crop);
        self
    }
}

#[derive(Debug)]
pub struct EmbeddingService {
    gate: Arc<ReadinessGate>,
    pool: WorkerPool,
}

impl EmbeddingService {
    pub fn new(gate: Arc<ReadinessGate>, workers: usize) -> Self {
        Self {
            gate,
            pool: WorkerPool::new(workers),
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Embed one image
    ///
    /// If the returned future is dropped (client gone), the queued request
    /// is abandoned and a running one skips inference.
    pub async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingVector, ServiceError> {
        let runtime = self.gate.runtime().ok_or_else(|| self.unavailable())?;

        let crop = request.crop.unwrap_or_else(|| runtime.default_crop());
        let size = request.image_bytes.len();
        debug!("Embedding request: {} bytes, crop={}", size, crop);

        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();
        let started = Instant::now();

        let image_bytes = request.image_bytes;
        let result = self
            .pool
            .run(&cancel, move |token| {
                runtime.embed_blocking(&image_bytes, crop, token)
            })
            .await;
        guard.disarm();

        let vector = match result {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                warn!("Embedding request failed: {}", e);
                return Err(e);
            }
            Err(PoolError::Cancelled) => return Err(ServiceError::Cancelled),
            Err(PoolError::Closed) => {
                return Err(ServiceError::Unavailable("service is shutting down".to_string()))
            }
            Err(PoolError::Panicked(reason)) => {
                warn!("Embedding worker panicked: {}", reason);
                return Err(ServiceError::Internal(reason));
            }
        };

        info!(
            "Embedded {} byte image into {} dimensions in {:?}",
            size,
            vector.dimension(),
            started.elapsed()
        );
        Ok(vector)
    }

    /// Answer a health probe for `service`
    pub fn health_check(&self, service: &str) -> HealthReport {
        if !is_known_service(service) {
            return HealthReport::new(
                ServingStatus::ServiceUnknown,
                format!("Unknown service: {}", service),
                self.gate.is_ready(),
                None,
            );
        }

        let state = self.gate.state();
        let status = ServingStatus::from_readiness(state);
        match state {
            ReadinessState::Ready => match self.gate.runtime() {
                Some(runtime) => HealthReport::new(
                    status,
                    format!("Model loaded from {}", runtime.model_info().model_path.display()),
                    true,
                    Some(runtime.dimension()),
                ),
                // Failed between the two loads
                None => HealthReport::new(
                    ServingStatus::NotServing,
                    self.failure_message(),
                    false,
                    None,
                ),
            },
            ReadinessState::NotReady => {
                HealthReport::new(status, "Model is loading", false, None)
            }
            ReadinessState::Failed => {
                HealthReport::new(status, self.failure_message(), false, None)
            }
        }
    }

    /// Stop accepting embedding work
    pub fn shutdown(&self) {
        self.pool.close();
    }

    fn unavailable(&self) -> ServiceError {
        match self.gate.state() {
            ReadinessState::Failed => ServiceError::Unavailable(self.failure_message()),
            _ => ServiceError::Unavailable("Model is loading".to_string()),
        }
    }

    fn failure_message(&self) -> String {
        format!(
            "Model failed to load: {}",
            self.gate.failure_reason().unwrap_or("unknown error")
        )
    }
}
