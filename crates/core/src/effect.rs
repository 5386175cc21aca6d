// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure data describing side effects the engine wants performed. Kept
//! separate from execution so effect construction stays unit-testable
//! without a runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Serializes a `Duration` as milliseconds, matching the teacher's
/// `duration_serde` helper used throughout its effect log fields.
pub mod duration_serde {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Spawn the child CLI for a conversation's agent run.
    SpawnAgent {
        conversation_key: String,
        provider: String,
        prompt: String,
        #[serde(with = "duration_serde")]
        timeout: Duration,
    },
    /// Append one progress note to the status message.
    SendProgress { conversation_key: String, text: String, synthetic: bool, persist: bool },
    /// Start a detached job.
    StartJob { conversation_key: String, command: String, workdir: PathBuf },
    /// Stop a running job by id (SIGTERM to its process group).
    StopJob { job_id: String },
    /// Attach a watcher to a job.
    WatchJob { job_id: String, every_sec: u64 },
    /// Arm a named timer.
    SetTimer { timer_id: String, #[serde(with = "duration_serde")] delay: Duration },
    /// Cancel a previously armed timer.
    CancelTimer { timer_id: String },
    /// Run an external shell helper (git/python3 invocations treated as
    /// opaque external tools).
    Shell { argv: Vec<String>, workdir: PathBuf },
    /// Queue a new task onto a session's Ralph loop.
    EnqueueTask { conversation_key: String, prompt: String },
    /// Send an operator-facing notification outside the chat transport.
    Notify { message: String },
}

impl Effect {
    /// Short, stable name used as a tracing span field.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::SpawnAgent { .. } => "spawn_agent",
            Effect::SendProgress { .. } => "send_progress",
            Effect::StartJob { .. } => "start_job",
            Effect::StopJob { .. } => "stop_job",
            Effect::WatchJob { .. } => "watch_job",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
            Effect::Shell { .. } => "shell",
            Effect::EnqueueTask { .. } => "enqueue_task",
            Effect::Notify { .. } => "notify",
        }
    }

    /// Structured key/value fields suitable for a tracing span, avoiding
    /// large payloads like full prompts.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::SpawnAgent { conversation_key, provider, .. } => vec![
                ("conversation_key", conversation_key.clone()),
                ("provider", provider.clone()),
            ],
            Effect::SendProgress { conversation_key, synthetic, persist, .. } => vec![
                ("conversation_key", conversation_key.clone()),
                ("synthetic", synthetic.to_string()),
                ("persist", persist.to_string()),
            ],
            Effect::StartJob { conversation_key, workdir, .. } => vec![
                ("conversation_key", conversation_key.clone()),
                ("workdir", workdir.display().to_string()),
            ],
            Effect::StopJob { job_id } => vec![("job_id", job_id.clone())],
            Effect::WatchJob { job_id, every_sec } => {
                vec![("job_id", job_id.clone()), ("every_sec", every_sec.to_string())]
            }
            Effect::SetTimer { timer_id, .. } => vec![("timer_id", timer_id.clone())],
            Effect::CancelTimer { timer_id } => vec![("timer_id", timer_id.clone())],
            Effect::Shell { argv, workdir } => vec![
                ("argv0", argv.first().cloned().unwrap_or_default()),
                ("workdir", workdir.display().to_string()),
            ],
            Effect::EnqueueTask { conversation_key, .. } => {
                vec![("conversation_key", conversation_key.clone())]
            }
            Effect::Notify { .. } => vec![],
        }
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
