// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model source resolution
//!
//! Decides, once at startup, whether the model artifact is already on disk
//! or must be fetched from object storage. A usable local file always wins
//! over remote configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ModelConfig, ObjectStorageConfig};

/// Object storage credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Everything needed to fetch the artifact from object storage
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSource {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub object_key: String,
    pub credentials: Credentials,
    /// Where the fetched artifact is written
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    Local { path: PathBuf },
    Remote(RemoteSource),
}

impl ModelSource {
    /// Path the artifact is or will be loaded from
    pub fn artifact_path(&self) -> &Path {
        match self {
            ModelSource::Local { path } => path,
            ModelSource::Remote(remote) => &remote.destination,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ModelSource::Remote(_))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error(
        "Configuration error: no model artifact at {} and remote source incomplete (missing: {})",
        .model_path.display(),
        .missing.join(", ")
    )]
    MissingInputs {
        model_path: PathBuf,
        missing: Vec<&'static str>,
    },

    #[error("Configuration error: NCP_MODEL_KEY {0:?} does not name an object")]
    InvalidObjectKey(String),
}

/// Answers whether a path holds a usable artifact
pub trait ArtifactProbe {
    fn is_usable(&self, path: &Path) -> bool;
}

/// Filesystem probe: an existing, non-empty regular file
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl ArtifactProbe for FsProbe {
    fn is_usable(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

/// Resolve against the real filesystem
pub fn resolve(
    model: &ModelConfig,
    storage: &ObjectStorageConfig,
) -> Result<ModelSource, ResolveError> {
    resolve_with(model, storage, &FsProbe)
}

/// Resolve with an explicit artifact probe
///
/// Order:
/// 1. `MODEL_PATH`, if usable
/// 2. `MODEL_CACHE_DIR/<basename of NCP_MODEL_KEY>`, if usable
/// 3. Remote, if access key, secret key, bucket and key are all set
/// 4. Otherwise `ResolveError::MissingInputs` naming every absent input
pub fn resolve_with(
    model: &ModelConfig,
    storage: &ObjectStorageConfig,
    probe: &dyn ArtifactProbe,
) -> Result<ModelSource, ResolveError> {
    if probe.is_usable(&model.model_path) {
        info!("Using local model artifact {}", model.model_path.display());
        return Ok(ModelSource::Local {
            path: model.model_path.clone(),
        });
    }

    let cached = match storage.model_key.as_deref() {
        Some(key) => Some(cached_artifact_path(&model.cache_dir, key)?),
        None => None,
    };

    if let Some(ref path) = cached {
        if probe.is_usable(path) {
            info!("Using previously downloaded model artifact {}", path.display());
            return Ok(ModelSource::Local { path: path.clone() });
        }
    }

    debug!(
        "No local artifact at {}; checking remote configuration",
        model.model_path.display()
    );

    let fields = [
        ("NCP_ACCESS_KEY", storage.access_key.as_ref()),
        ("NCP_SECRET_KEY", storage.secret_key.as_ref()),
        ("NCP_BUCKET_NAME", storage.bucket_name.as_ref()),
        ("NCP_MODEL_KEY", storage.model_key.as_ref()),
    ];
    let missing: Vec<&'static str> = fields
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| *name)
        .collect();

    match (
        &storage.access_key,
        &storage.secret_key,
        &storage.bucket_name,
        &storage.model_key,
        cached,
    ) {
        (Some(access_key), Some(secret_key), Some(bucket), Some(key), Some(destination)) => {
            info!(
                "Model will be fetched from s3://{}/{} ({})",
                bucket, key, storage.endpoint
            );
            Ok(ModelSource::Remote(RemoteSource {
                endpoint: storage.endpoint.clone(),
                region: storage.region.clone(),
                bucket: bucket.clone(),
                object_key: key.clone(),
                credentials: Credentials {
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                },
                destination,
            }))
        }
        _ => {
            let mut named = vec!["MODEL_PATH"];
            named.extend(missing);
            Err(ResolveError::MissingInputs {
                model_path: model.model_path.clone(),
                missing: named,
            })
        }
    }
}

/// `cache_dir/<last path segment of key>`
pub fn cached_artifact_path(cache_dir: &Path, key: &str) -> Result<PathBuf, ResolveError> {
    let name = key.rsplit('/').next().unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ResolveError::InvalidObjectKey(key.to_string()));
    }
    Ok(cache_dir.join(name))
}
