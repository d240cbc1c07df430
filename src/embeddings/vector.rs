// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-length embedding vector

use serde::{Deserialize, Serialize};

use super::EngineError;

/// Embedding produced for one nose image
///
/// Never empty and never contains NaN or infinite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap raw model output, rejecting empty or non-finite vectors
    pub fn new(values: Vec<f32>) -> Result<Self, EngineError> {
        if values.is_empty() {
            return Err(EngineError::Inference(
                "model produced an empty embedding".to_string(),
            ));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::Inference(format!(
                "embedding[{}] is not finite: {}",
                index, values[index]
            )));
        }
        Ok(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}
