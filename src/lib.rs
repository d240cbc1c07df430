// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod embeddings;
pub mod logging;
pub mod models;
pub mod service;
pub mod version;
pub mod vision;

// Re-export main types
pub use bootstrap::{provision, provision_with, ProvisionError};
pub use config::{ConfigError, ServiceConfig};
pub use embeddings::{EmbeddingEngine, EmbeddingVector, EngineError, ModelInfo};
pub use models::{FetchError, ModelSource, ResolveError};
pub use service::{
    EmbeddingRequest, EmbeddingService, ReadinessGate, ReadinessState, ServiceError,
    ServingRuntime, ServingStatus,
};
pub use vision::{ImageError, ImagePreprocessor};
