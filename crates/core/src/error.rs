// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy threaded through every crate in the workspace.

use thiserror::Error;

/// The error taxonomy described in the error-handling design: each variant
/// maps to one user-visible failure mode and one retry/propagation policy.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("stale session: {0}")]
    StaleSession(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("validation failed: {0}")]
    ValidationFail(String),

    #[error("artifact timeout: required files not observed: {0:?}")]
    ArtifactTimeout(Vec<String>),

    #[error("supervisor validation failed: {0}")]
    SupervisorValidationFail(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether this error class should be retried automatically by a
    /// caller that has a retry policy available.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Transient(_) | RelayError::StaleSession(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
