// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod embed;
pub mod errors;
pub mod health;
pub mod http_server;

pub use embed::{embed_handler, EmbedRequest, EmbedResponse};
pub use errors::{ApiError, ErrorResponse};
pub use health::{health_check_handler, health_probe_handler, HealthCheckRequest};
pub use http_server::{create_app, request_body_limit, serve, AppState};
