// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared helpers for integration tests: a deterministic engine, image
//! builders and an in-process fake S3 endpoint.
#![allow(dead_code)]

use axum::{
    extract::{Path as AxumPath, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use nose_embedder::embeddings::{
    check_input_shape, EmbeddingEngine, EmbeddingVector, EngineError, ModelInfo,
};
use nose_embedder::service::{EmbeddingService, ReadinessGate, ServingRuntime};
use nose_embedder::vision::{ImagePreprocessor, PreprocessConfig};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_DIMENSION: usize = 16;

/// Deterministic engine: each output lane is the mean of a strided slice
/// of the input. Optionally sleeps to simulate inference cost.
pub struct TestEngine {
    shape: Vec<usize>,
    dimension: usize,
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl TestEngine {
    pub fn new(shape: [usize; 4]) -> Self {
        Self {
            shape: shape.to_vec(),
            dimension: TEST_DIMENSION,
            delay: Duration::ZERO,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of concurrent `embed` calls observed
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingEngine for TestEngine {
    fn embed(&self, input: &Array4<f32>) -> Result<EmbeddingVector, EngineError> {
        check_input_shape(&self.shape, input)?;
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let values = (0..self.dimension)
            .map(|lane| {
                let (sum, count) = input
                    .iter()
                    .skip(lane)
                    .step_by(self.dimension)
                    .fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
                sum / count.max(1) as f32
            })
            .collect();

        self.running.fetch_sub(1, Ordering::SeqCst);
        EmbeddingVector::new(values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn input_shape(&self) -> &[usize] {
        &self.shape
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_path: PathBuf::from("test_engine.onnx"),
            input_name: "input".to_string(),
            output_name: "embedding".to_string(),
            input_shape: self.shape.clone(),
            dimension: self.dimension,
            provider: "test".to_string(),
        }
    }
}

/// Runtime over a `TestEngine` with the default 96x96 grayscale preprocessing
pub fn test_runtime(engine: Arc<TestEngine>) -> ServingRuntime {
    let preprocessor = ImagePreprocessor::new(PreprocessConfig::default());
    ServingRuntime::new(engine, preprocessor, true).expect("shapes match")
}

pub fn default_engine() -> Arc<TestEngine> {
    Arc::new(TestEngine::new([1, 96, 96, 1]))
}

/// Service whose gate has not opened yet
pub fn pending_service(workers: usize) -> (Arc<ReadinessGate>, Arc<EmbeddingService>) {
    let gate = Arc::new(ReadinessGate::new());
    let service = Arc::new(EmbeddingService::new(gate.clone(), workers));
    (gate, service)
}

/// Service that is already READY
pub fn ready_service(engine: Arc<TestEngine>, workers: usize) -> Arc<EmbeddingService> {
    let (gate, service) = pending_service(workers);
    gate.open(test_runtime(engine)).expect("gate opens");
    service
}

/// White image with a dark centered square, encoded in `format`
pub fn nose_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(width, height, Rgb([240, 240, 240]));
    for y in height / 3..height * 2 / 3 {
        for x in width / 3..width * 2 / 3 {
            img.put_pixel(x, y, Rgb([20, 25, 30]));
        }
    }
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, format)
        .expect("encode test image");
    buf.into_inner()
}

pub fn nose_png() -> Vec<u8> {
    nose_image(120, 90, ImageFormat::Png)
}

pub fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// One scripted response of the fake object store
#[derive(Clone)]
pub enum FakeResponse {
    Object(Vec<u8>),
    Status(StatusCode, &'static str),
}

#[derive(Clone)]
struct FakeS3State {
    script: Arc<Mutex<Vec<FakeResponse>>>,
    requests: Arc<AtomicUsize>,
    signed: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

/// In-process S3 stand-in. Responses are served in order; the last one
/// repeats once the script runs out.
pub struct FakeS3 {
    pub addr: SocketAddr,
    state: FakeS3State,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeS3 {
    pub async fn start(script: Vec<FakeResponse>) -> Self {
        let state = FakeS3State {
            script: Arc::new(Mutex::new(script)),
            requests: Arc::new(AtomicUsize::new(0)),
            signed: Arc::new(AtomicUsize::new(0)),
            paths: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/:bucket/*key", get(fake_get_object))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake s3");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Requests that carried a SigV4 `Authorization` header
    pub fn signed_requests(&self) -> usize {
        self.state.signed.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.state.paths.lock().expect("paths lock").clone()
    }
}

impl Drop for FakeS3 {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn fake_get_object(
    State(state): State<FakeS3State>,
    AxumPath((bucket, key)): AxumPath<(String, String)>,
    headers: HeaderMap,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    state
        .paths
        .lock()
        .expect("paths lock")
        .push(format!("{}/{}", bucket, key));

    let signed = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("AWS4-HMAC-SHA256 Credential="))
        .unwrap_or(false);
    if signed && headers.contains_key("x-amz-date") {
        state.signed.fetch_add(1, Ordering::SeqCst);
    }

    let next = {
        let mut script = state.script.lock().expect("script lock");
        if script.len() > 1 {
            script.remove(0)
        } else {
            script
                .first()
                .cloned()
                .unwrap_or(FakeResponse::Status(StatusCode::NOT_FOUND, "NoSuchKey"))
        }
    };

    match next {
        FakeResponse::Object(body) => {
            let checksum = base64::engine::general_purpose::STANDARD.encode(Sha256::digest(&body));
            let mut response = body.into_response();
            if headers
                .get("x-amz-checksum-mode")
                .map(|v| v == "ENABLED")
                .unwrap_or(false)
            {
                if let Ok(value) = HeaderValue::from_str(&checksum) {
                    response.headers_mut().insert("x-amz-checksum-sha256", value);
                }
            }
            response
        }
        FakeResponse::Status(status, code) => {
            let xml = format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                 <Error><Code>{}</Code><Message>{}</Message></Error>",
                code, code
            );
            (status, xml).into_response()
        }
    }
}
