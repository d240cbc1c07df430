// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding API Module
//!
//! POST /v1/embed: one base64 nose image in, one embedding vector out.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::embed_handler;
pub use request::EmbedRequest;
pub use response::EmbedResponse;
