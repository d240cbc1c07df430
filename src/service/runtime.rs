// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Everything a worker needs to turn image bytes into an embedding

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ServiceError;
use crate::embeddings::{EmbeddingEngine, EmbeddingVector, EngineError, ModelInfo};
use crate::vision::ImagePreprocessor;

/// The result of provisioning: a loaded engine paired with the
/// preprocessor that produces tensors of the shape it accepts
pub struct ServingRuntime {
    engine: Arc<dyn EmbeddingEngine>,
    preprocessor: ImagePreprocessor,
    default_crop: bool,
    model_info: ModelInfo,
}

impl std::fmt::Debug for ServingRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingRuntime")
            .field("model_info", &self.model_info)
            .field("preprocessor", &self.preprocessor)
            .field("default_crop", &self.default_crop)
            .finish_non_exhaustive()
    }
}

impl ServingRuntime {
    /// Pair an engine with a preprocessor
    ///
    /// # Errors
    /// `EngineError::ShapeMismatch` if the preprocessor output does not
    /// match the engine input.
    pub fn new(
        engine: Arc<dyn EmbeddingEngine>,
        preprocessor: ImagePreprocessor,
        default_crop: bool,
    ) -> Result<Self, EngineError> {
        let produced = preprocessor.input_shape();
        if engine.input_shape() != produced.as_slice() {
            return Err(EngineError::ShapeMismatch {
                expected: engine.input_shape().to_vec(),
                actual: produced.to_vec(),
            });
        }

        let model_info = engine.model_info();
        Ok(Self {
            engine,
            preprocessor,
            default_crop,
            model_info,
        })
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.model_info
    }

    pub fn dimension(&self) -> usize {
        self.engine.dimension()
    }

    pub fn default_crop(&self) -> bool {
        self.default_crop
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Preprocess then infer, on the calling (blocking) thread
    ///
    /// The token is checked between the two steps so a request whose
    /// client has gone away skips inference.
    pub fn embed_blocking(
        &self,
        image_bytes: &[u8],
        crop: bool,
        cancel: &CancellationToken,
    ) -> Result<EmbeddingVector, ServiceError> {
        let tensor = self.preprocessor.preprocess(image_bytes, crop)?;

        if cancel.is_cancelled() {
            debug!("Request cancelled after preprocessing; skipping inference");
            return Err(ServiceError::Cancelled);
        }

        self.engine.embed(&tensor).map_err(ServiceError::from)
    }
}
