// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Health and version endpoint tests (GET /health, POST /v1/health, GET /version)

use crate::common::{default_engine, pending_service, test_runtime, TEST_DIMENSION};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use nose_embedder::api::{create_app, request_body_limit, AppState, ErrorResponse};
use nose_embedder::service::{HealthReport, ServingStatus, SERVICE_NAME};
use serde_json::json;
use tower::ServiceExt;

async fn send(app: Router, request: Request<Body>) -> (StatusCode, HealthReport) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).expect("health body"))
}

fn probe() -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap()
}

fn check(service: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/health")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "service": service }).to_string()))
        .unwrap()
}

#[cfg(test)]
mod health_endpoint_tests {
    use super::*;

    /// Probe is 503 while loading and 200 once serving
    #[tokio::test]
    async fn test_probe_follows_readiness() {
        let (gate, service) = pending_service(1);
        let app = create_app(AppState::new(service), 1024);

        let (status, report) = send(app.clone(), probe()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, ServingStatus::NotServing);

        gate.open(test_runtime(default_engine())).unwrap();
        let (status, report) = send(app, probe()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, ServingStatus::Serving);
        assert_eq!(report.dimension, Some(TEST_DIMENSION));
    }

    /// Named checks always answer 200 with the status in the body
    #[tokio::test]
    async fn test_named_service() {
        let (gate, service) = pending_service(1);
        let app = create_app(AppState::new(service), 1024);

        let (status, report) = send(app.clone(), check(SERVICE_NAME)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, ServingStatus::NotServing);

        gate.open(test_runtime(default_engine())).unwrap();
        let (_, report) = send(app.clone(), check(SERVICE_NAME)).await;
        assert_eq!(report.status, ServingStatus::Serving);
        assert!(report.model_loaded);

        let (_, report) = send(app, check("")).await;
        assert_eq!(report.status, ServingStatus::Serving);
    }

    /// Unknown names get SERVICE_UNKNOWN
    #[tokio::test]
    async fn test_unknown_service() {
        let (gate, service) = pending_service(1);
        gate.open(test_runtime(default_engine())).unwrap();
        let app = create_app(AppState::new(service), 1024);

        let (status, report) = send(app, check("grpc.health.v1.Other")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, ServingStatus::ServiceUnknown);
    }

    /// A failed startup is visible to probes with its reason
    #[tokio::test]
    async fn test_failed_startup_reported() {
        let (gate, service) = pending_service(1);
        gate.fail("IntegrityError: checksum mismatch");
        let app = create_app(AppState::new(service), 1024);

        let (status, report) = send(app, probe()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(report.message.contains("checksum mismatch"));
        assert!(!report.model_loaded);
    }

    /// The wire format uses SCREAMING_SNAKE_CASE status names
    #[tokio::test]
    async fn test_status_wire_format() {
        let (_gate, service) = pending_service(1);
        let app = create_app(AppState::new(service), 1024);

        let response = app.oneshot(probe()).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "NOT_SERVING");
        assert!(json.get("dimension").is_none());
        assert!(json["timestamp"].is_string());
    }

    /// Oversized bodies are 413, malformed ones 400
    #[tokio::test]
    async fn test_rejected_bodies() {
        let (_gate, service) = pending_service(1);
        let app = create_app(AppState::new(service), 1024);

        let oversized = check(&"x".repeat(request_body_limit(1024) + 1));
        let response = app.clone().oneshot(oversized).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error.error_type, "payload_too_large");

        let malformed = Request::builder()
            .method("POST")
            .uri("/v1/health")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"service\": "))
            .unwrap();
        let response = app.oneshot(malformed).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Version info is served regardless of readiness
    #[tokio::test]
    async fn test_version_endpoint() {
        let (_gate, service) = pending_service(1);
        let app = create_app(AppState::new(service), 1024);

        let request = Request::builder()
            .method("GET")
            .uri("/version")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert!(json["features"].is_array());
    }
}
