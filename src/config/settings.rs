// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Environment-sourced settings for the embedder
//!
//! Every option has a default so the service starts with nothing but a model
//! file next to it. Values that are present but unparseable are rejected
//! instead of falling back to the default.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::models::downloading::RetryPolicy;
use crate::vision::{InputChannels, TensorLayout};

/// Default bind port of the RPC surface
pub const DEFAULT_PORT: u16 = 50052;

/// Default worker pool size
pub const DEFAULT_WORKERS: usize = 3;

/// Default maximum request body (10MB)
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 10 * 1024 * 1024;

/// Default NCP Object Storage endpoint
pub const DEFAULT_NCP_ENDPOINT: &str = "https://kr.object.ncloudstorage.com";

/// Default NCP Object Storage region
pub const DEFAULT_NCP_REGION: &str = "kr-standard";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub image: ImageConfig,
    pub storage: ObjectStorageConfig,
    pub retry_policy: RetryPolicy,
    /// Per-attempt timeout for the artifact download
    pub fetch_timeout: Duration,
    pub logging: LoggingConfig,
}

/// RPC surface settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Fixed size of the embedding worker pool
    pub workers: usize,
    pub max_message_length: usize,
    pub shutdown_grace: Duration,
}

/// Model artifact and input tensor settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Conventional local artifact location
    pub model_path: PathBuf,
    /// Square input dimension expected by the model
    pub input_size: u32,
    pub input_channels: InputChannels,
    pub input_layout: TensorLayout,
    /// ONNX Runtime intra-op threads per inference
    pub intra_threads: usize,
    /// Directory downloaded artifacts are written to
    pub cache_dir: PathBuf,
    /// Expected hex SHA-256 of the artifact, if pinned
    pub expected_sha256: Option<String>,
}

/// Preprocessing defaults
#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub enable_center_crop: bool,
    pub center_crop_ratio: f32,
}

/// NCP Object Storage settings. Credentials and object identity are optional;
/// the source resolver decides whether they are complete.
#[derive(Clone)]
pub struct ObjectStorageConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub endpoint: String,
    pub region: String,
    pub bucket_name: Option<String>,
    pub model_key: Option<String>,
}

impl fmt::Debug for ObjectStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorageConfig")
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket_name", &self.bucket_name)
            .field("model_key", &self.model_key)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "plain" => Ok(LogFormat::Text),
            other => Err(format!("expected json or text, got {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    pub format: LogFormat,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first when present;
    /// variables already set in the process environment win.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let defaults = RetryPolicy::default();
        let config = Self {
            server: ServerConfig {
                host: vars
                    .string("GRPC_HOST")
                    .unwrap_or_else(|| "0.0.0.0".to_string()),
                port: vars.parse("GRPC_PORT", DEFAULT_PORT)?,
                workers: vars.parse("GRPC_WORKERS", DEFAULT_WORKERS)?,
                max_message_length: vars
                    .parse("GRPC_MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH)?,
                shutdown_grace: Duration::from_secs(vars.parse("SHUTDOWN_GRACE_SECS", 5u64)?),
            },
            model: ModelConfig {
                model_path: vars
                    .string("MODEL_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("embedder_model.onnx")),
                input_size: vars.parse("MODEL_INPUT_SIZE", 96u32)?,
                input_channels: vars.parse("MODEL_INPUT_CHANNELS", InputChannels::Grayscale)?,
                input_layout: vars.parse("MODEL_INPUT_LAYOUT", TensorLayout::Nhwc)?,
                intra_threads: vars.parse("MODEL_INTRA_THREADS", 1usize)?,
                cache_dir: vars
                    .string("MODEL_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp/models")),
                expected_sha256: vars.string("MODEL_SHA256").map(|s| s.to_ascii_lowercase()),
            },
            image: ImageConfig {
                enable_center_crop: vars.flag("ENABLE_CENTER_CROP", true)?,
                center_crop_ratio: vars.parse("CENTER_CROP_RATIO", 0.6f32)?,
            },
            storage: ObjectStorageConfig {
                access_key: vars.string("NCP_ACCESS_KEY"),
                secret_key: vars.string("NCP_SECRET_KEY"),
                endpoint: vars
                    .string("NCP_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_NCP_ENDPOINT.to_string()),
                region: vars
                    .string("NCP_REGION")
                    .unwrap_or_else(|| DEFAULT_NCP_REGION.to_string()),
                bucket_name: vars.string("NCP_BUCKET_NAME"),
                model_key: vars.string("NCP_MODEL_KEY"),
            },
            retry_policy: RetryPolicy {
                max_retries: vars.parse("FETCH_MAX_RETRIES", defaults.max_retries)?,
                initial_delay_ms: vars.parse("FETCH_INITIAL_BACKOFF_MS", defaults.initial_delay_ms)?,
                max_delay_ms: vars.parse("FETCH_MAX_BACKOFF_MS", defaults.max_delay_ms)?,
                exponential_base: defaults.exponential_base,
            },
            fetch_timeout: Duration::from_secs(vars.parse("FETCH_TIMEOUT_SECS", 300u64)?),
            logging: LoggingConfig {
                level: vars
                    .string("LOG_LEVEL")
                    .map(|s| s.to_ascii_lowercase())
                    .unwrap_or_else(|| "info".to_string()),
                format: vars.parse("LOG_FORMAT", LogFormat::Json)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.workers == 0 {
            return Err(ConfigError::Invalid(
                "GRPC_WORKERS must be greater than 0".to_string(),
            ));
        }
        if self.server.max_message_length == 0 {
            return Err(ConfigError::Invalid(
                "GRPC_MAX_MESSAGE_LENGTH must be greater than 0".to_string(),
            ));
        }
        if self.model.input_size == 0 {
            return Err(ConfigError::Invalid(
                "MODEL_INPUT_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.model.intra_threads == 0 {
            return Err(ConfigError::Invalid(
                "MODEL_INTRA_THREADS must be greater than 0".to_string(),
            ));
        }
        let ratio = self.image.center_crop_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "CENTER_CROP_RATIO must be in (0, 1], got {}",
                ratio
            )));
        }
        if let Some(ref digest) = self.model.expected_sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigError::Invalid(
                    "MODEL_SHA256 must be 64 hex characters".to_string(),
                ));
            }
        }
        if self.retry_policy.initial_delay_ms > self.retry_policy.max_delay_ms {
            return Err(ConfigError::Invalid(
                "FETCH_INITIAL_BACKOFF_MS cannot exceed FETCH_MAX_BACKOFF_MS".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket address string for the RPC listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                workers: DEFAULT_WORKERS,
                max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
                shutdown_grace: Duration::from_secs(5),
            },
            model: ModelConfig {
                model_path: PathBuf::from("embedder_model.onnx"),
                input_size: 96,
                input_channels: InputChannels::Grayscale,
                input_layout: TensorLayout::Nhwc,
                intra_threads: 1,
                cache_dir: PathBuf::from("/tmp/models"),
                expected_sha256: None,
            },
            image: ImageConfig {
                enable_center_crop: true,
                center_crop_ratio: 0.6,
            },
            storage: ObjectStorageConfig {
                access_key: None,
                secret_key: None,
                endpoint: DEFAULT_NCP_ENDPOINT.to_string(),
                region: DEFAULT_NCP_REGION.to_string(),
                bucket_name: None,
                model_key: None,
            },
            retry_policy: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(300),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Json,
            },
        }
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    /// Trimmed value, with empty strings treated as unset
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.string(key) {
            Some(value) => value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                key,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.string(key) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key,
                    value,
                    reason: "expected a boolean".to_string(),
                }),
            },
            None => Ok(default),
        }
    }
}
