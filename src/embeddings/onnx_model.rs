// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX Runtime wrapper for the nose embedding model
//!
//! The model takes one preprocessed nose image (batch of one) and returns a
//! fixed-length embedding. Its internals are opaque: only the input shape
//! and the length of the first output matter here.
//!
//! Features:
//! - ONNX model loading from disk on the CPU execution provider
//! - Load-time validation inference to detect shape mismatches early
//! - Output dimension discovered from the validation run
//! - Thread-safe `embed` shared by every worker

use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::{check_input_shape, EmbeddingEngine, EmbeddingVector, EngineError, ModelInfo};

const PROVIDER_NAME: &str = "CPUExecutionProvider";

/// Settings for loading the ONNX artifact
#[derive(Debug, Clone)]
pub struct OnnxModelConfig {
    /// Path to the .onnx artifact
    pub model_path: PathBuf,
    /// Exact input shape, e.g. `[1, 96, 96, 1]`
    pub input_shape: [usize; 4],
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

/// ONNX-based nose embedding model
///
/// # Thread Safety
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex owned by the handle. Callers share the handle through `Arc`
/// without any locking of their own. Inference calls are serialized;
/// workers overlap only in preprocessing.
pub struct OnnxEmbeddingModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    input_shape: Vec<usize>,
    dimension: usize,
    model_path: PathBuf,
}

impl std::fmt::Debug for OnnxEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbeddingModel")
            .field("model_path", &self.model_path)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_shape", &self.input_shape)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbeddingModel {
    /// Loads the model and validates it with one inference on a zero tensor
    ///
    /// This is the most expensive startup step and blocks the calling
    /// thread; run it on a blocking task.
    ///
    /// # Errors
    /// Returns `EngineError::ModelNotLoaded` if:
    /// - Model file not found
    /// - ONNX Runtime cannot parse or initialise the artifact
    /// - The model rejects the configured input shape
    /// - The model produces an empty output
    pub fn load(config: &OnnxModelConfig) -> Result<Self, EngineError> {
        let model_path = config.model_path.as_path();

        if !model_path.is_file() {
            return Err(EngineError::ModelNotLoaded(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        info!("Loading ONNX embedding model from {}", model_path.display());

        let mut session = build_session(model_path, config.intra_threads)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| EngineError::ModelNotLoaded("model declares no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| EngineError::ModelNotLoaded("model declares no outputs".to_string()))?;

        debug!(
            "Model session created - input: {}, output: {}",
            input_name, output_name
        );

        // Validation inference; outputs are dropped before the session moves
        let dimension = {
            let probe = Array4::<f32>::zeros(config.input_shape);
            let output = run_session(&mut session, &input_name, &probe).map_err(|e| {
                EngineError::ModelNotLoaded(format!(
                    "validation inference with input shape {:?} failed: {}",
                    config.input_shape, e
                ))
            })?;
            if output.is_empty() {
                return Err(EngineError::ModelNotLoaded(
                    "model produced an empty output".to_string(),
                ));
            }
            output.len()
        };

        info!(
            "✅ ONNX embedding model loaded (input: {} {:?}, output: {}, {} dimensions)",
            input_name, config.input_shape, output_name, dimension
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            input_shape: config.input_shape.to_vec(),
            dimension,
            model_path: config.model_path.clone(),
        })
    }
}

impl EmbeddingEngine for OnnxEmbeddingModel {
    fn embed(&self, input: &Array4<f32>) -> Result<EmbeddingVector, EngineError> {
        check_input_shape(&self.input_shape, input)?;

        let output = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EngineError::Inference("model session lock poisoned".to_string()))?;
            run_session(&mut session, &self.input_name, input).map_err(EngineError::Inference)?
        };

        if output.len() != self.dimension {
            return Err(EngineError::Inference(format!(
                "unexpected embedding dimension: {} (expected {})",
                output.len(),
                self.dimension
            )));
        }

        EmbeddingVector::new(output)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_path: self.model_path.clone(),
            input_name: self.input_name.clone(),
            output_name: self.output_name.clone(),
            input_shape: self.input_shape.clone(),
            dimension: self.dimension,
            provider: PROVIDER_NAME.to_string(),
        }
    }
}

fn build_session(model_path: &Path, intra_threads: usize) -> Result<Session, EngineError> {
    Session::builder()
        .map_err(|e| load_error("failed to create session builder", e))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|e| load_error("failed to set CPU execution provider", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error("failed to set optimization level", e))?
        .with_intra_threads(intra_threads)
        .map_err(|e| load_error("failed to set intra threads", e))?
        .commit_from_file(model_path)
        .map_err(|e| {
            load_error(
                &format!("failed to load ONNX model from {}", model_path.display()),
                e,
            )
        })
}

fn load_error(step: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::ModelNotLoaded(format!("{}: {}", step, e))
}

/// Run one inference and flatten the first output
fn run_session(
    session: &mut Session,
    input_name: &str,
    input: &Array4<f32>,
) -> Result<Vec<f32>, String> {
    let input_value = Value::from_array(input.to_owned())
        .map_err(|e| format!("failed to create input tensor: {}", e))?;

    let outputs = session
        .run(ort::inputs![input_name => input_value])
        .map_err(|e| format!("inference failed: {}", e))?;

    // Index 0 rather than by name; exported models name their output freely
    let output_tensor = outputs[0]
        .try_extract_array::<f32>()
        .map_err(|e| format!("failed to extract output tensor: {}", e))?;

    Ok(output_tensor.iter().copied().collect())
}
