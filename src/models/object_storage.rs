// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! S3-compatible object storage client (NCP Object Storage, MinIO, AWS S3)
//!
//! Path-style addressing, SigV4-signed GET, body streamed straight to disk.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, ETAG};
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use super::downloading::{FetchError, ObjectMetadata, ObjectStore};
use super::signing::{self, CanonicalRequest, SigningParams, EMPTY_PAYLOAD_SHA256};
use super::source::{Credentials, RemoteSource};

const CHECKSUM_MODE_HEADER: &str = "x-amz-checksum-mode";
const CHECKSUM_SHA256_HEADER: &str = "x-amz-checksum-sha256";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct S3ObjectStore {
    client: Client,
    endpoint: Url,
    region: String,
    credentials: Credentials,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Create a client for the endpoint named by `source`
    ///
    /// `timeout` bounds each attempt, including the body transfer.
    pub fn new(source: &RemoteSource, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = Url::parse(&source.endpoint).map_err(|e| {
            FetchError::InvalidEndpoint(format!("{:?}: {}", source.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(FetchError::InvalidEndpoint(format!(
                "{:?} has no host",
                source.endpoint
            )));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Io(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            region: source.region.clone(),
            credentials: source.credentials.clone(),
        })
    }

    /// Value of the `Host` header, including a non-default port
    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    fn object_url(&self, path: &str) -> Url {
        let mut url = self.endpoint.clone();
        let base = self.endpoint.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base, path));
        url.set_query(None);
        url
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        destination: &Path,
    ) -> Result<ObjectMetadata, FetchError> {
        let path = signing::object_path(bucket, key);
        let url = self.object_url(&path);
        let host = self.host_header();

        let params = SigningParams {
            access_key: &self.credentials.access_key,
            secret_key: &self.credentials.secret_key,
            region: &self.region,
            service: "s3",
            timestamp: Utc::now(),
        };
        let amz_date = params.amz_date();
        let headers = [
            ("host", host),
            (CHECKSUM_MODE_HEADER, "ENABLED".to_string()),
            ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
            ("x-amz-date", amz_date.clone()),
        ];
        let authorization = signing::authorization_header(
            &CanonicalRequest {
                method: "GET",
                uri: url.path(),
                query: "",
                headers: &headers,
                payload_sha256: EMPTY_PAYLOAD_SHA256,
            },
            &params,
        );

        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .header(CHECKSUM_MODE_HEADER, "ENABLED")
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256)
            .header("x-amz-date", amz_date)
            .header("authorization", authorization)
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let content_length = header_u64(response.headers(), CONTENT_LENGTH.as_str());
        let sha256 = checksum_sha256(response.headers());
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        let mut file = tokio::fs::File::create(destination).await.map_err(|e| {
            FetchError::Io(format!("failed to create {}: {}", destination.display(), e))
        })?;

        let mut bytes_written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| FetchError::transient(format!("download interrupted: {}", e)))?;
            file.write_all(&chunk).await.map_err(|e| {
                FetchError::Io(format!("failed to write {}: {}", destination.display(), e))
            })?;
            bytes_written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| {
            FetchError::Io(format!("failed to flush {}: {}", destination.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            FetchError::Io(format!("failed to sync {}: {}", destination.display(), e))
        })?;

        debug!(
            "Received {} bytes (content-length {:?}, checksum {})",
            bytes_written,
            content_length,
            if sha256.is_some() { "present" } else { "absent" }
        );

        Ok(ObjectMetadata {
            bytes_written,
            content_length,
            sha256,
            etag,
        })
    }
}

/// Map an error response to a `FetchError`, keeping the S3 error code
fn status_error(status: StatusCode, body: &str) -> FetchError {
    let code = xml_element(body, "Code");
    let message = xml_element(body, "Message");
    let detail = match (code, message) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    };
    FetchError::from_status(status.as_u16(), detail)
}

/// Text of the first `<name>…</name>` element in an S3 error document
fn xml_element<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{}>", name);
    let close = format!("</{}>", name);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Full-object SHA-256 from `x-amz-checksum-sha256`, as hex
///
/// Multipart uploads report a checksum-of-checksums (`<b64>-<parts>`),
/// which cannot be compared with the file digest and is ignored.
fn checksum_sha256(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CHECKSUM_SHA256_HEADER)?.to_str().ok()?.trim();
    if value.contains('-') {
        debug!("Ignoring composite checksum {}", value);
        return None;
    }
    match base64::engine::general_purpose::STANDARD.decode(value) {
        Ok(digest) if digest.len() == 32 => Some(hex::encode(digest)),
        _ => {
            warn!("Ignoring malformed {} header: {}", CHECKSUM_SHA256_HEADER, value);
            None
        }
    }
}
