// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model artifact provisioning: where it comes from and how it is fetched

pub mod downloading;
pub mod object_storage;
pub mod signing;
pub mod source;

pub use downloading::{
    ErrorCategory, FetchError, ModelArtifact, ModelFetcher, ObjectMetadata, ObjectStore,
    RetryPolicy,
};
pub use object_storage::S3ObjectStore;
pub use source::{
    resolve, resolve_with, ArtifactProbe, Credentials, FsProbe, ModelSource, RemoteSource,
    ResolveError,
};
