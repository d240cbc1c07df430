// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process-wide readiness gate
//!
//! `NOT_READY -> READY -> FAILED`, or `NOT_READY -> FAILED`. `FAILED` is
//! terminal. The serving runtime is published together with the `READY`
//! transition, so anyone who observes `READY` also sees the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{error, info};

use super::runtime::ServingRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadinessState {
    NotReady,
    Ready,
    Failed,
}

impl ReadinessState {
    fn as_u8(self) -> u8 {
        match self {
            ReadinessState::NotReady => 0,
            ReadinessState::Ready => 1,
            ReadinessState::Failed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ReadinessState::Ready,
            2 => ReadinessState::Failed,
            _ => ReadinessState::NotReady,
        }
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::NotReady => write!(f, "NOT_READY"),
            ReadinessState::Ready => write!(f, "READY"),
            ReadinessState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("readiness gate cannot open from state {0}")]
    InvalidTransition(ReadinessState),
}

pub struct ReadinessGate {
    state: AtomicU8,
    runtime: OnceLock<Arc<ServingRuntime>>,
    failure: OnceLock<String>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("state", &self.state())
            .field("failure", &self.failure.get())
            .finish()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ReadinessState::NotReady.as_u8()),
            runtime: OnceLock::new(),
            failure: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ReadinessState {
        ReadinessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    /// Publish the runtime and transition to `READY`
    ///
    /// Only valid from `NOT_READY`, and only once.
    pub fn open(&self, runtime: ServingRuntime) -> Result<(), GateError> {
        let current = self.state();
        if current != ReadinessState::NotReady {
            return Err(GateError::InvalidTransition(current));
        }
        if self.runtime.set(Arc::new(runtime)).is_err() {
            return Err(GateError::InvalidTransition(self.state()));
        }

        self.state
            .compare_exchange(
                ReadinessState::NotReady.as_u8(),
                ReadinessState::Ready.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|actual| GateError::InvalidTransition(ReadinessState::from_u8(actual)))?;

        info!("✅ Readiness: NOT_READY -> READY");
        Ok(())
    }

    /// Transition to the terminal `FAILED` state
    ///
    /// Returns false if the gate had already failed; the first reason wins.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let previous = ReadinessState::from_u8(
            self.state
                .swap(ReadinessState::Failed.as_u8(), Ordering::AcqRel),
        );
        if previous == ReadinessState::Failed {
            return false;
        }
        let _ = self.failure.set(reason.clone());
        error!("❌ Readiness: {} -> FAILED: {}", previous, reason);
        true
    }

    /// The runtime, only while `READY`
    pub fn runtime(&self) -> Option<Arc<ServingRuntime>> {
        if self.is_ready() {
            self.runtime.get().cloned()
        } else {
            None
        }
    }

    /// Why provisioning failed, once `FAILED`
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }
}
