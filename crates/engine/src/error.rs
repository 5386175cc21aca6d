// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level error taxonomy, layered on top of [`relay_core::error::RelayError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Relay(#[from] relay_core::error::RelayError),

    #[error(transparent)]
    Agent(#[from] relay_adapters::AgentError),

    #[error(transparent)]
    Transport(#[from] relay_adapters::TransportError),

    #[error(transparent)]
    Store(#[from] relay_storage::StoreError),

    #[error("no session for conversation {0}")]
    NoSession(String),

    #[error("no running job for conversation {0}")]
    NoRunningJob(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("task queue full ({0} pending)")]
    TaskQueueFull(usize),

    #[error("a priority question is already in flight for {0}")]
    PriorityQuestionBusy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
