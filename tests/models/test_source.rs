// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Model source resolution tests
//!
//! Exercises `resolve` against a real temporary directory: local artifacts
//! win, the download cache is reused, and incomplete remote configuration
//! names every missing input.

use nose_embedder::config::ServiceConfig;
use nose_embedder::models::{resolve, ModelSource, ResolveError};
use std::path::Path;

fn remote_config(dir: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.model.model_path = dir.join("embedder_model.onnx");
    config.model.cache_dir = dir.join("cache");
    config.storage.access_key = Some("access".to_string());
    config.storage.secret_key = Some("secret".to_string());
    config.storage.bucket_name = Some("models".to_string());
    config.storage.model_key = Some("nose/v3/embedder_model.onnx".to_string());
    config
}

#[cfg(test)]
mod source_tests {
    use super::*;

    /// A non-empty file at MODEL_PATH is used even with remote settings present
    #[test]
    fn test_local_artifact_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = remote_config(dir.path());
        std::fs::write(&config.model.model_path, b"onnx").unwrap();

        let source = resolve(&config.model, &config.storage).unwrap();
        assert_eq!(
            source,
            ModelSource::Local {
                path: config.model.model_path.clone()
            }
        );
        assert!(!source.is_remote());
    }

    /// A zero-byte file is not a usable artifact
    #[test]
    fn test_empty_local_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = remote_config(dir.path());
        std::fs::write(&config.model.model_path, b"").unwrap();

        let source = resolve(&config.model, &config.storage).unwrap();
        assert!(source.is_remote());
    }

    /// A directory at MODEL_PATH is not a usable artifact
    #[test]
    fn test_directory_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = remote_config(dir.path());
        std::fs::create_dir_all(&config.model.model_path).unwrap();

        let source = resolve(&config.model, &config.storage).unwrap();
        assert!(source.is_remote());
    }

    /// A previous download in the cache directory avoids the network
    #[test]
    fn test_cached_download_reused() {
        let dir = tempfile::tempdir().unwrap();
        let config = remote_config(dir.path());
        let cached = dir.path().join("cache").join("embedder_model.onnx");
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"onnx").unwrap();

        let source = resolve(&config.model, &config.storage).unwrap();
        assert_eq!(source, ModelSource::Local { path: cached });
    }

    /// Remote source targets the cache directory with the key's basename
    #[test]
    fn test_remote_destination() {
        let dir = tempfile::tempdir().unwrap();
        let config = remote_config(dir.path());

        match resolve(&config.model, &config.storage).unwrap() {
            ModelSource::Remote(remote) => {
                assert_eq!(remote.bucket, "models");
                assert_eq!(remote.object_key, "nose/v3/embedder_model.onnx");
                assert_eq!(
                    remote.destination,
                    dir.path().join("cache").join("embedder_model.onnx")
                );
                assert_eq!(remote.region, config.storage.region);
            }
            other => panic!("expected remote source, got {:?}", other),
        }
    }

    /// Missing secret key and bucket are both reported, alongside MODEL_PATH
    #[test]
    fn test_missing_inputs_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = remote_config(dir.path());
        config.storage.secret_key = None;
        config.storage.bucket_name = None;

        let err = resolve(&config.model, &config.storage).unwrap_err();
        match &err {
            ResolveError::MissingInputs { missing, .. } => {
                assert_eq!(
                    missing,
                    &vec!["MODEL_PATH", "NCP_SECRET_KEY", "NCP_BUCKET_NAME"]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("NCP_SECRET_KEY"));
        assert!(!message.contains("secret"), "secret values never appear");
    }

    /// Credentials never appear in debug output
    #[test]
    fn test_credentials_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let config = remote_config(dir.path());

        let source = resolve(&config.model, &config.storage).unwrap();
        let debug = format!("{:?}", source);
        assert!(!debug.contains("\"access\""));
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }

    /// A key ending in a slash cannot name a file
    #[test]
    fn test_key_without_basename_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = remote_config(dir.path());
        config.storage.model_key = Some("nose/v3/".to_string());

        let err = resolve(&config.model, &config.storage).unwrap_err();
        assert_eq!(err, ResolveError::InvalidObjectKey("nose/v3/".to_string()));
    }
}
