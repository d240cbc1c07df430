// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Worker pool bound under concurrent load
//!
//! More callers than workers: every request completes, inference never runs
//! wider than the pool, and health answers while the pool is saturated.

use crate::common::{nose_png, ready_service, TestEngine, TEST_DIMENSION};
use futures::future::join_all;
use nose_embedder::service::{EmbeddingRequest, ServiceError, ServingStatus, SERVICE_NAME};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    /// Ten concurrent embeds over three workers
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_inference() {
        let engine =
            Arc::new(TestEngine::new([1, 96, 96, 1]).with_delay(Duration::from_millis(50)));
        let service = ready_service(engine.clone(), 3);
        let image = nose_png();

        let requests = (0..10).map(|_| {
            let service = service.clone();
            let image = image.clone();
            async move { service.embed(EmbeddingRequest::new(image)).await }
        });

        let results = tokio::time::timeout(Duration::from_secs(30), join_all(requests))
            .await
            .expect("all requests complete");

        assert_eq!(results.len(), 10);
        for result in &results {
            let vector = result.as_ref().expect("embed succeeds");
            assert_eq!(vector.dimension(), TEST_DIMENSION);
        }
        assert_eq!(engine.calls(), 10);
        assert!(
            engine.peak_concurrency() <= 3,
            "peak concurrency {} exceeds pool size",
            engine.peak_concurrency()
        );
        assert_eq!(service.pool().in_flight(), 0);
    }

    /// Health is answered immediately while every worker is busy
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_health_not_blocked_by_embeds() {
        let engine =
            Arc::new(TestEngine::new([1, 96, 96, 1]).with_delay(Duration::from_millis(300)));
        let service = ready_service(engine.clone(), 1);
        let image = nose_png();

        let busy = {
            let service = service.clone();
            let image = image.clone();
            tokio::spawn(async move { service.embed(EmbeddingRequest::new(image)).await })
        };
        let queued = {
            let service = service.clone();
            tokio::spawn(async move { service.embed(EmbeddingRequest::new(image)).await })
        };

        // Let the first request take the only worker
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        let report = service.health_check(SERVICE_NAME);
        assert_eq!(report.status, ServingStatus::Serving);
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(busy.await.unwrap().is_ok());
        assert!(queued.await.unwrap().is_ok());
        assert_eq!(engine.peak_concurrency(), 1);
    }

    /// A caller that gives up while queued never reaches the engine
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abandoned_request_skips_inference() {
        let engine =
            Arc::new(TestEngine::new([1, 96, 96, 1]).with_delay(Duration::from_millis(300)));
        let service = ready_service(engine.clone(), 1);
        let image = nose_png();

        let busy = {
            let service = service.clone();
            let image = image.clone();
            tokio::spawn(async move { service.embed(EmbeddingRequest::new(image)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Times out while waiting for the only worker
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            service.embed(EmbeddingRequest::new(image)),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(busy.await.unwrap().is_ok());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.calls(), 1);
    }

    /// Closing the pool during load turns waiting callers away
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_while_queued() {
        let engine =
            Arc::new(TestEngine::new([1, 96, 96, 1]).with_delay(Duration::from_millis(200)));
        let service = ready_service(engine, 1);
        let image = nose_png();

        let busy = {
            let service = service.clone();
            let image = image.clone();
            tokio::spawn(async move { service.embed(EmbeddingRequest::new(image)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let queued = {
            let service = service.clone();
            tokio::spawn(async move { service.embed(EmbeddingRequest::new(image)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        service.shutdown();

        assert!(busy.await.unwrap().is_ok(), "in-flight work completes");
        let err = queued.await.unwrap().unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }
}
