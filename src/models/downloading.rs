// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Remote model fetcher
//!
//! Downloads the single model artifact from object storage at startup.
//! Every failure carries an `ErrorCategory`; whether it is retried is
//! decided in exactly one place, `ErrorCategory::is_retryable`.
//!
//! Downloads land in `<destination>.part` and are renamed into place only
//! after the integrity checks pass, so a half-written file is never picked
//! up as a usable local artifact on the next start.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::source::RemoteSource;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1`: `min(initial * base^attempt, max)`
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let delay = self.initial_delay_ms as f64 * self.exponential_base.powi(exponent);
        let capped = if delay.is_finite() {
            delay.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped as u64)
    }
}

/// Closed set of fetch failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 401/403: credentials rejected or bucket policy forbids access
    PermissionDenied,
    /// 404: bucket or key does not exist
    NotFound,
    /// Any other 4xx
    Rejected,
    /// Timeouts, interrupted transfers, throttling and 5xx
    Transient,
    /// Downloaded bytes fail verification
    Integrity,
    /// Local filesystem failure
    Io,
}

impl ErrorCategory {
    /// The retry table
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorCategory::Transient => true,
            ErrorCategory::PermissionDenied
            | ErrorCategory::NotFound
            | ErrorCategory::Rejected
            | ErrorCategory::Integrity
            | ErrorCategory::Io => false,
        }
    }

    /// Classify an HTTP status returned by the object store
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorCategory::PermissionDenied,
            404 => ErrorCategory::NotFound,
            408 | 429 => ErrorCategory::Transient,
            500..=599 => ErrorCategory::Transient,
            _ => ErrorCategory::Rejected,
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Remote access denied (status {status}): {message}")]
    PermissionDenied { status: u16, message: String },

    #[error("Remote object not found (status {status}): {message}")]
    NotFound { status: u16, message: String },

    #[error("Remote request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transient network error{}: {message}", .status.map(|s| format!(" (status {})", s)).unwrap_or_default())]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid object storage endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Local I/O error: {0}")]
    Io(String),

    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Build the error for a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match ErrorCategory::from_status(status) {
            ErrorCategory::PermissionDenied => FetchError::PermissionDenied { status, message },
            ErrorCategory::NotFound => FetchError::NotFound { status, message },
            ErrorCategory::Transient => FetchError::Transient {
                status: Some(status),
                message,
            },
            _ => FetchError::Rejected { status, message },
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::PermissionDenied { .. } => ErrorCategory::PermissionDenied,
            FetchError::NotFound { .. } => ErrorCategory::NotFound,
            FetchError::Rejected { .. } | FetchError::InvalidEndpoint(_) => {
                ErrorCategory::Rejected
            }
            FetchError::Transient { .. } => ErrorCategory::Transient,
            FetchError::Integrity(_) => ErrorCategory::Integrity,
            FetchError::Io(_) => ErrorCategory::Io,
            FetchError::RetriesExhausted { last, .. } => last.category(),
        }
    }

    /// Provider status code, where one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::PermissionDenied { status, .. }
            | FetchError::NotFound { status, .. }
            | FetchError::Rejected { status, .. } => Some(*status),
            FetchError::Transient { status, .. } => *status,
            FetchError::RetriesExhausted { last, .. } => last.status(),
            FetchError::InvalidEndpoint(_) | FetchError::Integrity(_) | FetchError::Io(_) => None,
        }
    }
}

/// What the provider reported about a completed transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    /// Bytes written to the destination
    pub bytes_written: u64,
    /// `Content-Length` of the response, if sent
    pub content_length: Option<u64>,
    /// Full-object SHA-256 as lowercase hex, if the provider returned one
    pub sha256: Option<String>,
    pub etag: Option<String>,
}

/// Object storage as seen by the fetcher
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream `bucket/key` into `destination`, creating or truncating it
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<ObjectMetadata, FetchError>;
}

/// A verified artifact on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Downloads one remote artifact with bounded retries and verification
pub struct ModelFetcher {
    store: Arc<dyn ObjectStore>,
    retry_policy: RetryPolicy,
    expected_sha256: Option<String>,
}

impl ModelFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, retry_policy: RetryPolicy) -> Self {
        Self {
            store,
            retry_policy,
            expected_sha256: None,
        }
    }

    /// Pin the artifact to a known SHA-256 (hex, case-insensitive)
    pub fn with_expected_sha256(mut self, digest: Option<String>) -> Self {
        self.expected_sha256 = digest.map(|d| d.to_ascii_lowercase());
        self
    }

    /// Fetch `source` to its destination path
    ///
    /// # Errors
    /// - `PermissionDenied`, `NotFound`, `Rejected`: returned after one call
    /// - `RetriesExhausted`: transient failures outlasted the retry budget
    /// - `Integrity`: the downloaded bytes failed verification
    /// - `Io`: the destination could not be written
    pub async fn fetch(&self, source: &RemoteSource) -> Result<ModelArtifact, FetchError> {
        let destination = source.destination.as_path();
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FetchError::Io(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }
        let partial = partial_path(destination);

        info!(
            "Fetching model s3://{}/{} from {} to {}",
            source.bucket,
            source.object_key,
            source.endpoint,
            destination.display()
        );

        let started = Instant::now();
        let mut attempt = 0;
        let metadata = loop {
            debug!("Fetch attempt {}", attempt + 1);
            match self
                .store
                .get_object(&source.bucket, &source.object_key, &partial)
                .await
            {
                Ok(metadata) => break metadata,
                Err(error) => {
                    remove_partial(&partial).await;

                    if !error.category().is_retryable() {
                        warn!("Fetch failed without retry: {}", error);
                        return Err(error);
                    }
                    if attempt >= self.retry_policy.max_retries {
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: Box::new(error),
                        });
                    }

                    let delay = self.retry_policy.delay_for(attempt);
                    warn!(
                        "Fetch attempt {} failed: {}. Retrying in {:?}",
                        attempt + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        let sha256 = match self.verify(&partial, &metadata).await {
            Ok(digest) => digest,
            Err(error) => {
                remove_partial(&partial).await;
                return Err(error);
            }
        };

        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|e| {
                FetchError::Io(format!(
                    "failed to move {} into place: {}",
                    partial.display(),
                    e
                ))
            })?;

        info!(
            "✅ Model downloaded: {} ({} bytes, sha256 {}, etag {}) in {:?}",
            destination.display(),
            metadata.bytes_written,
            sha256,
            metadata.etag.as_deref().unwrap_or("-"),
            started.elapsed()
        );

        Ok(ModelArtifact {
            path: destination.to_path_buf(),
            size_bytes: metadata.bytes_written,
            sha256,
        })
    }

    /// Check size and digests; returns the computed SHA-256
    async fn verify(&self, path: &Path, metadata: &ObjectMetadata) -> Result<String, FetchError> {
        let on_disk = tokio::fs::metadata(path)
            .await
            .map_err(|e| FetchError::Io(format!("failed to stat {}: {}", path.display(), e)))?
            .len();

        if on_disk == 0 {
            return Err(FetchError::Integrity("downloaded artifact is empty".to_string()));
        }
        if on_disk != metadata.bytes_written {
            return Err(FetchError::Integrity(format!(
                "wrote {} bytes but file holds {}",
                metadata.bytes_written, on_disk
            )));
        }
        if let Some(expected) = metadata.content_length {
            if expected != on_disk {
                return Err(FetchError::Integrity(format!(
                    "size mismatch - expected: {}, actual: {}",
                    expected, on_disk
                )));
            }
        }

        let actual = sha256_file(path).await?;

        if let Some(ref reported) = metadata.sha256 {
            if !reported.eq_ignore_ascii_case(&actual) {
                return Err(FetchError::Integrity(format!(
                    "provider checksum mismatch - expected: {}, actual: {}",
                    reported, actual
                )));
            }
        }
        if let Some(ref pinned) = self.expected_sha256 {
            if pinned != &actual {
                return Err(FetchError::Integrity(format!(
                    "checksum mismatch - expected: {}, actual: {}",
                    pinned, actual
                )));
            }
        }

        Ok(actual)
    }
}

/// `<destination>.part`
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial download {}: {}", path.display(), e),
    }
}

/// Lowercase hex SHA-256 of a file
pub async fn sha256_file(path: &Path) -> Result<String, FetchError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| FetchError::Io(format!("failed to open {}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .await
            .map_err(|e| FetchError::Io(format!("failed to read {}: {}", path.display(), e)))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
