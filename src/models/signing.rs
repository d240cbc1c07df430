// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! AWS Signature Version 4 for S3-compatible object storage
//!
//! Only what a single unauthenticated-payload GET needs: canonical request,
//! string to sign, derived signing key and the `Authorization` header value.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// SHA-256 of an empty payload, used for GET requests
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Credentials and scope for one signature
#[derive(Clone, Copy)]
pub struct SigningParams<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub timestamp: DateTime<Utc>,
}

impl SigningParams<'_> {
    /// `x-amz-date` header value
    pub fn amz_date(&self) -> String {
        self.timestamp.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn date_stamp(&self) -> String {
        self.timestamp.format("%Y%m%d").to_string()
    }

    fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date_stamp(),
            self.region,
            self.service
        )
    }
}

/// A request reduced to the parts that are signed
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    /// Already URI-encoded absolute path
    pub uri: &'a str,
    /// Already canonicalised query string, empty when absent
    pub query: &'a str,
    /// Header name/value pairs; must include `host` and `x-amz-date`
    pub headers: &'a [(&'a str, String)],
    pub payload_sha256: &'a str,
}

impl CanonicalRequest<'_> {
    fn signed_headers(&self) -> (String, String) {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect::<String>();
        let signed = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        (canonical, signed)
    }

    fn canonical_form(&self) -> (String, String) {
        let (canonical_headers, signed_headers) = self.signed_headers();
        let canonical = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.uri,
            self.query,
            canonical_headers,
            signed_headers,
            self.payload_sha256
        );
        (canonical, signed_headers)
    }
}

/// Compute the `Authorization` header value for a request
pub fn authorization_header(request: &CanonicalRequest<'_>, params: &SigningParams<'_>) -> String {
    let (canonical, signed_headers) = request.canonical_form();
    let scope = params.credential_scope();

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        params.amz_date(),
        scope,
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let key = signing_key(params);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, params.access_key, scope, signed_headers, signature
    )
}

fn signing_key(params: &SigningParams<'_>) -> Vec<u8> {
    let secret = format!("AWS4{}", params.secret_key);
    let date_key = hmac_sha256(secret.as_bytes(), params.date_stamp().as_bytes());
    let region_key = hmac_sha256(&date_key, params.region.as_bytes());
    let service_key = hmac_sha256(&region_key, params.service.as_bytes());
    hmac_sha256(&service_key, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Percent-encode one path segment the way SigV4 canonicalises it
///
/// Everything except unreserved characters (`A-Z a-z 0-9 - _ . ~`) is
/// encoded, including `/`.
pub fn uri_encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Path-style object path: `/<bucket>/<key segments>`
pub fn object_path(bucket: &str, key: &str) -> String {
    let mut path = format!("/{}", uri_encode_segment(bucket));
    for segment in key.split('/') {
        path.push('/');
        path.push_str(&uri_encode_segment(segment));
    }
    path
}
