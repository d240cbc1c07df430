// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration loaded from the process environment

pub mod settings;

pub use settings::{
    ConfigError, ImageConfig, DEFAULT_MAX_MESSAGE_LENGTH, LogFormat, LoggingConfig, ModelConfig, ObjectStorageConfig,
    ServerConfig, ServiceConfig,
};
