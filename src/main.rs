// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use nose_embedder::{
    api::{self, AppState},
    bootstrap,
    config::ServiceConfig,
    logging,
    service::{EmbeddingService, ReadinessGate},
    version,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ ConfigError: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging);

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServiceConfig) -> Result<ExitCode> {
    info!("🚀 Starting {}", version::get_version_string());
    info!(
        "Configuration: workers={}, input={}x{} ({:?}, {}), crop={} (ratio {})",
        config.server.workers,
        config.model.input_size,
        config.model.input_size,
        config.model.input_channels,
        config.model.input_layout,
        config.image.enable_center_crop,
        config.image.center_crop_ratio
    );

    let gate = Arc::new(ReadinessGate::new());
    let service = Arc::new(EmbeddingService::new(gate.clone(), config.server.workers));
    info!("Worker pool ready: {} workers", service.pool().size());

    // Bind before provisioning so probes see NOT_SERVING rather than a refused connection
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    let shutdown = CancellationToken::new();
    let app = api::create_app(AppState::new(service.clone()), config.server.max_message_length);
    let server = tokio::spawn(api::serve(
        listener,
        app,
        shutdown.clone(),
        config.server.shutdown_grace,
    ));

    let provisioned = tokio::select! {
        result = bootstrap::provision(&config) => Some(result),
        _ = shutdown_signal() => None,
    };

    let code = match provisioned {
        Some(Ok(runtime)) => {
            gate.open(runtime).context("failed to open readiness gate")?;
            info!("✅ Serving on {}", address);

            shutdown_signal().await;
            info!("Shutdown signal received");
            ExitCode::SUCCESS
        }
        Some(Err(e)) => {
            gate.fail(e.to_string());
            error!(error_kind = e.kind(), "❌ Startup failed: {}: {}", e.kind(), e);
            ExitCode::FAILURE
        }
        None => {
            warn!("Shutdown signal received during provisioning");
            ExitCode::SUCCESS
        }
    };

    service.shutdown();
    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => info!("Server stopped"),
        Ok(Err(e)) => warn!("Server error during shutdown: {}", e),
        Err(e) => warn!("Server task failed: {}", e),
    }

    Ok(code)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
