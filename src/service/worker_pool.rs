// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed-size pool for CPU-bound embedding work
//!
//! At most `size` jobs run at once; further callers wait for a permit.
//! Jobs run on tokio's blocking threads and hold their permit until they
//! return, even if the caller stops waiting.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("request cancelled while queued")]
    Cancelled,

    #[error("worker pool is closed")]
    Closed,

    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    /// Stop handing out permits; queued and future callers get `Closed`
    pub fn close(&self) {
        self.permits.close();
    }

    /// Run `job` once a worker is free
    ///
    /// Returns `Cancelled` if `cancel` fires while still queued. Once
    /// started, the job receives the token and decides when to check it.
    pub async fn run<F, T>(&self, cancel: &CancellationToken, job: F) -> Result<T, PoolError>
    where
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| PoolError::Closed)?
            }
        };

        let token = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&token)
        })
        .await
        .map_err(|e| PoolError::Panicked(e.to_string()))
    }
}
