// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Startup provisioning: resolve -> fetch -> load -> runtime
//!
//! Runs exactly once per process, before the readiness gate opens. Every
//! error here is fatal for the process.

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

use crate::config::ServiceConfig;
use crate::embeddings::{EmbeddingEngine, EngineError, OnnxEmbeddingModel, OnnxModelConfig};
use crate::models::{
    self, ErrorCategory, FetchError, ModelFetcher, ModelSource, ObjectStore, ResolveError,
    S3ObjectStore,
};
use crate::service::ServingRuntime;
use crate::vision::{ImagePreprocessor, PreprocessConfig};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Configuration(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    ModelNotLoaded(#[from] EngineError),

    #[error("Provisioning task failed: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Error class name logged with the failure
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::Configuration(_) => "ConfigurationError",
            ProvisionError::Fetch(e) => match e.category() {
                ErrorCategory::PermissionDenied
                | ErrorCategory::NotFound
                | ErrorCategory::Rejected => "RemoteAccessError",
                ErrorCategory::Transient => "TransientNetworkError",
                ErrorCategory::Integrity => "IntegrityError",
                ErrorCategory::Io => "IoError",
            },
            ProvisionError::ModelNotLoaded(_) => "ModelNotLoadedError",
            ProvisionError::Internal(_) => "InternalError",
        }
    }
}

/// Provision against real object storage and ONNX Runtime
pub async fn provision(config: &ServiceConfig) -> Result<ServingRuntime, ProvisionError> {
    provision_with(config, load_onnx_engine).await
}

/// Provision with a custom engine loader
///
/// The loader runs on a blocking thread.
pub async fn provision_with<L>(
    config: &ServiceConfig,
    loader: L,
) -> Result<ServingRuntime, ProvisionError>
where
    L: FnOnce(&OnnxModelConfig) -> Result<Arc<dyn EmbeddingEngine>, EngineError>
        + Send
        + 'static,
{
    let started = Instant::now();

    let source = models::resolve(&config.model, &config.storage)?;
    info!(
        "Model source: {} ({})",
        source.artifact_path().display(),
        if source.is_remote() { "remote" } else { "local" }
    );
    let artifact_path = match source {
        ModelSource::Local { path } => path,
        ModelSource::Remote(remote) => {
            let store: Arc<dyn ObjectStore> =
                Arc::new(S3ObjectStore::new(&remote, config.fetch_timeout)?);
            let fetcher = ModelFetcher::new(store, config.retry_policy.clone())
                .with_expected_sha256(config.model.expected_sha256.clone());
            fetcher.fetch(&remote).await?.path
        }
    };

    let preprocessor = ImagePreprocessor::new(PreprocessConfig {
        target_size: config.model.input_size,
        channels: config.model.input_channels,
        layout: config.model.input_layout,
        center_crop_ratio: config.image.center_crop_ratio,
    });
    let engine_config = OnnxModelConfig {
        model_path: artifact_path,
        input_shape: preprocessor.input_shape(),
        intra_threads: config.model.intra_threads,
    };

    let engine = tokio::task::spawn_blocking(move || loader(&engine_config))
        .await
        .map_err(|e| ProvisionError::Internal(format!("model load task: {}", e)))??;

    let runtime = ServingRuntime::new(engine, preprocessor, config.image.enable_center_crop)?;

    info!(
        "Provisioning complete in {:?} ({} dimensions)",
        started.elapsed(),
        runtime.dimension()
    );
    Ok(runtime)
}

/// Load the artifact with ONNX Runtime
pub fn load_onnx_engine(
    config: &OnnxModelConfig,
) -> Result<Arc<dyn EmbeddingEngine>, EngineError> {
    let model = OnnxEmbeddingModel::load(config)?;
    Ok(Arc::new(model))
}
