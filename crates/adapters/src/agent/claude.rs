// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `claude -p --resume` backend: argv assembly and a one-shot
//! NDJSON-streaming `AgentCliAdapter` implementation.
//!
//! This replaces the teacher's interactive tmux-driven Claude adapter with a
//! one-shot `stream-json` subprocess, since the chat relay has no terminal
//! to attach to; the NDJSON parsing and progress-callback plumbing are
//! otherwise the same shape as the teacher's agent drivers.

use super::{AgentCliAdapter, AgentError, AgentRunOutcome, AgentSpawnConfig, ProgressNote, Provider};
use async_trait::async_trait;

pub const PROGRAM: &str = "claude";

/// Builds the argv: `-p --output-format stream-json --verbose
/// [--model M] [--permission-mode X] [--allowedTools A,B,C]
/// [--resume <sid>] -- <prompt>`.
pub fn build_argv(config: &AgentSpawnConfig) -> Vec<String> {
    assert_eq!(config.provider, Provider::Claude);
    let mut argv = vec![
        "-p".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ];

    if let Some(model) = &config.model {
        argv.push("--model".to_string());
        argv.push(model.clone());
    }
    if let Some(mode) = &config.permission_mode {
        argv.push("--permission-mode".to_string());
        argv.push(mode.clone());
    }
    if !config.allowed_tools.is_empty() {
        argv.push("--allowedTools".to_string());
        argv.push(config.allowed_tools.join(","));
    }
    if let Some(session_id) = &config.resume_session_id {
        argv.push("--resume".to_string());
        argv.push(session_id.clone());
    }

    argv.push("--".to_string());
    argv.push(config.prompt.clone());
    argv
}

/// Claude may emit a bogus `"type":"system","subtype":"init"` event right
/// before a non-zero exit; this is a documented transient retried once with
/// identical args, distinguished from a real init failure only by the exit
/// happening immediately after that event with no assistant output.
pub fn is_transient_init_exit(last_event: Option<&relay_core::event::AgentEvent>) -> bool {
    matches!(
        last_event,
        Some(relay_core::event::AgentEvent::System { subtype }) if subtype == "init"
    )
}

/// Matches the stderr patterns the heavy model emits when its quota is
/// exhausted, so the runner can retry once against `quota_fallback_model`
/// instead of surfacing the failure.
pub fn is_heavy_model_quota_exhausted(stderr_tail: &str) -> bool {
    let lower = stderr_tail.to_lowercase();
    ["quota", "usage limit", "rate_limit_exceeded", "429"].iter().any(|pattern| lower.contains(pattern))
}

pub struct ClaudeAgentAdapter;

#[async_trait]
impl AgentCliAdapter for ClaudeAgentAdapter {
    async fn run(
        &self,
        config: AgentSpawnConfig,
        on_progress: &(dyn Fn(ProgressNote) + Send + Sync),
        on_spawn: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<AgentRunOutcome, AgentError> {
        let argv = build_argv(&config);
        crate::agent::stream_child(PROGRAM, &argv, &config, on_progress, on_spawn).await
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
