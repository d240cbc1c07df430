// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference engine handle for nose embeddings
//!
//! The engine is loaded once at startup and shared read-only by every
//! worker. `EmbeddingEngine` is the seam the service depends on; the ONNX
//! Runtime implementation lives in `onnx_model`.

pub mod onnx_model;
pub mod vector;

use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use onnx_model::{OnnxEmbeddingModel, OnnxModelConfig};
pub use vector::EmbeddingVector;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The artifact could not be parsed or initialised. Fatal at startup.
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// A single inference failed. Local to one request.
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input shape: {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Metadata about a loaded model, reported by the health protocol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_path: PathBuf,
    pub input_name: String,
    pub output_name: String,
    pub input_shape: Vec<usize>,
    pub dimension: usize,
    pub provider: String,
}

/// A loaded, runtime-ready embedding model
///
/// Implementations must be safe to call concurrently from many workers and
/// must not keep request data between calls: the same tensor always yields
/// the same vector.
pub trait EmbeddingEngine: Send + Sync {
    /// Run the model on one preprocessed tensor
    fn embed(&self, input: &Array4<f32>) -> Result<EmbeddingVector, EngineError>;

    /// Fixed output dimensionality
    fn dimension(&self) -> usize;

    /// Shape `embed` accepts
    fn input_shape(&self) -> &[usize];

    fn model_info(&self) -> ModelInfo;
}

/// Validate a tensor against the shape an engine expects
pub fn check_input_shape(expected: &[usize], input: &Array4<f32>) -> Result<(), EngineError> {
    if input.shape() != expected {
        return Err(EngineError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: input.shape().to_vec(),
        });
    }
    Ok(())
}
