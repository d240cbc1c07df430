// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! EmbedResponse type for POST /v1/embed

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingVector;

/// Response body for POST /v1/embed
///
/// # Example
/// ```json
/// {
///   "vector": [0.012, -0.334, ...],
///   "vectorSize": 128
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbedResponse {
    pub vector: Vec<f32>,
    pub vector_size: usize,
}

impl From<EmbeddingVector> for EmbedResponse {
    fn from(vector: EmbeddingVector) -> Self {
        let vector = vector.into_inner();
        Self {
            vector_size: vector.len(),
            vector,
        }
    }
}
