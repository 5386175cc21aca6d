// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AgentCliAdapter`: the contract component C (the child-process
//! supervisor) is built against. One implementation per provider backend
//! (`codex`, `claude`), plus a `FakeAgentCliAdapter` for engine tests.

pub mod claude;
pub mod codex;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use relay_core::event::{self, AgentEvent};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Codex,
    Claude,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Codex => "codex",
            Provider::Claude => "claude",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentSpawnConfig {
    pub provider: Provider,
    pub prompt: String,
    pub resume_session_id: Option<String>,
    pub workdir: PathBuf,
    pub sandbox_mode: Option<String>,
    pub model: Option<String>,
    pub permission_mode: Option<String>,
    pub allowed_tools: Vec<String>,
    pub ephemeral: bool,
    pub upload_root: Option<PathBuf>,
    pub extra_feature_flags: Vec<(String, String)>,
    pub approval_policy: Option<String>,
    pub skip_git_repo_check: bool,
    pub timeout: Duration,
    pub debug_full_commands: bool,
}

impl AgentSpawnConfig {
    pub fn new(provider: Provider, prompt: impl Into<String>, workdir: PathBuf) -> Self {
        Self {
            provider,
            prompt: prompt.into(),
            resume_session_id: None,
            workdir,
            sandbox_mode: None,
            model: None,
            permission_mode: None,
            allowed_tools: Vec::new(),
            ephemeral: false,
            upload_root: None,
            extra_feature_flags: Vec::new(),
            approval_policy: None,
            skip_git_repo_check: true,
            timeout: Duration::from_secs(600),
            debug_full_commands: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentRunOutcome {
    pub session_id: Option<String>,
    pub final_text: String,
    pub model: Option<String>,
    /// Set when the final-result text and the last-assistant text both
    /// existed and diverged; the longer of the two was kept as
    /// `final_text` per §4.C's reconciliation rule.
    pub divergence_detected: bool,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("stale session: {0}")]
    StaleSession(String),
    #[error("transient error: {0}")]
    Transient(String),
    #[error("heavy model quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("child exited {exit_code}: {tail}")]
    NonZeroExit { exit_code: i32, tail: String },
    #[error("failed to spawn child: {0}")]
    Spawn(#[from] crate::process::SpawnError),
}

/// One line of progress derived from an NDJSON event, handed to the
/// caller's callback as soon as it is produced.
#[derive(Debug, Clone)]
pub struct ProgressNote {
    pub text: String,
    pub synthetic: bool,
}

#[async_trait]
pub trait AgentCliAdapter: Send + Sync {
    /// Runs the child to completion, invoking `on_progress` once per
    /// derived progress note as events stream in, and `on_spawn` once with
    /// the child's pid as soon as it is known (before the child is
    /// awaited), so a caller can track it for later signal delivery.
    async fn run(
        &self,
        config: AgentSpawnConfig,
        on_progress: &(dyn Fn(ProgressNote) + Send + Sync),
        on_spawn: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<AgentRunOutcome, AgentError>;
}

/// Bound on how many trailing stdout/stderr lines are kept for error
/// diagnostics when the child fails without a typed event to explain why.
const TAIL_LIMIT: usize = 20;

fn push_bounded(tail: &mut std::collections::VecDeque<String>, line: String) {
    if tail.len() >= TAIL_LIMIT {
        tail.pop_front();
    }
    tail.push_back(line);
}

/// Shared run loop for both provider backends: spawns `program argv`, tees
/// stdout through the NDJSON parser while emitting one [`ProgressNote`] per
/// recognized event, and reconciles the final assistant text per the
/// documented divergence rule. Provider-specific argv assembly and
/// stale/transient classification stay in `codex.rs`/`claude.rs`.
pub(crate) async fn stream_child(
    program: &str,
    argv: &[String],
    config: &AgentSpawnConfig,
    on_progress: &(dyn Fn(ProgressNote) + Send + Sync),
    on_spawn: &(dyn Fn(u32) + Send + Sync),
) -> Result<AgentRunOutcome, AgentError> {
    let env = crate::process::build_child_env(config.upload_root.as_deref());
    let mut child = crate::process::spawn_child(program, argv, &env, Some(&config.workdir))?;
    if let Some(pid) = child.id() {
        on_spawn(pid);
    }

    // `spawn_child` always requests `Stdio::piped()` for both streams.
    #[allow(clippy::expect_used)]
    let stdout = child.stdout.take().expect("stdout piped at spawn");
    #[allow(clippy::expect_used)]
    let stderr = child.stderr.take().expect("stderr piped at spawn");

    let mut session_id: Option<String> = None;
    let mut last_assistant_text: Option<String> = None;
    let mut final_result_text: Option<String> = None;
    let mut last_event: Option<AgentEvent> = None;
    let mut non_json_tail: std::collections::VecDeque<String> = std::collections::VecDeque::new();
    let mut stderr_tail: std::collections::VecDeque<String> = std::collections::VecDeque::new();

    let stdout_task = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match event::parse_line(&line) {
                Some((raw, parsed_event)) => {
                    if session_id.is_none() {
                        session_id = event::extract_session_id(&parsed_event, &raw);
                    }
                    if let Some(note) = progress_note_for(&parsed_event) {
                        on_progress(note);
                    }
                    match &parsed_event {
                        AgentEvent::Assistant { text: Some(text) } => last_assistant_text = Some(text.clone()),
                        AgentEvent::Result { text: Some(text) } => final_result_text = Some(text.clone()),
                        AgentEvent::ItemCompleted { item_type, text: Some(text) } if item_type == "agent_message" => {
                            final_result_text = Some(text.clone());
                        }
                        _ => {}
                    }
                    last_event = Some(parsed_event);
                }
                None => push_bounded(&mut non_json_tail, line),
            }
        }
    };
    let stderr_task = async {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            push_bounded(&mut stderr_tail, line);
        }
    };
    tokio::join!(stdout_task, stderr_task);

    let status = crate::process::wait_with_timeout(child, config.timeout)
        .await
        .map_err(|err| match err {
            crate::process::SpawnError::Timeout(duration) => AgentError::Timeout(duration),
            other => AgentError::Spawn(other),
        })?;

    let stderr_joined = Vec::from(stderr_tail).join("\n");
    let stdout_joined = Vec::from(non_json_tail).join("\n");
    let combined_tail = if stderr_joined.is_empty() { stdout_joined.clone() } else { stderr_joined.clone() };

    if !status.success() {
        let exit_code = status.code().unwrap_or(-1);
        return Err(classify_failure(config.provider, exit_code, &stderr_joined, last_event.as_ref(), combined_tail));
    }

    let (final_text, divergence_detected) = reconcile_final_text(final_result_text, last_assistant_text);

    Ok(AgentRunOutcome {
        session_id,
        final_text,
        model: config.model.clone(),
        divergence_detected,
    })
}

fn classify_failure(
    provider: Provider,
    exit_code: i32,
    stderr_tail: &str,
    last_event: Option<&AgentEvent>,
    tail: String,
) -> AgentError {
    match provider {
        Provider::Codex => {
            if codex::is_stale_session_error(stderr_tail) {
                return AgentError::StaleSession(stderr_tail.to_string());
            }
            if codex::is_transient_runtime_error(exit_code, stderr_tail) {
                return AgentError::Transient(stderr_tail.to_string());
            }
        }
        Provider::Claude => {
            if claude::is_heavy_model_quota_exhausted(stderr_tail) {
                return AgentError::QuotaExhausted(stderr_tail.to_string());
            }
            if claude::is_transient_init_exit(last_event) {
                return AgentError::Transient("bogus system/init event at exit".to_string());
            }
        }
    }
    AgentError::NonZeroExit { exit_code, tail }
}

/// §4.C's reconciliation rule: if both a final-result text and a
/// last-assistant text exist and diverge, keep the longer one and flag the
/// divergence for telemetry; otherwise take whichever source exists.
fn reconcile_final_text(final_result_text: Option<String>, last_assistant_text: Option<String>) -> (String, bool) {
    match (final_result_text, last_assistant_text) {
        (Some(result), Some(assistant)) if result != assistant => {
            let longer = if result.len() >= assistant.len() { result } else { assistant };
            (longer, true)
        }
        (Some(result), _) => (result, false),
        (None, Some(assistant)) => (assistant, false),
        (None, None) => (String::new(), false),
    }
}

fn progress_note_for(event: &AgentEvent) -> Option<ProgressNote> {
    match event {
        AgentEvent::ToolUse { name, summary } => Some(ProgressNote {
            text: summary.clone().unwrap_or_else(|| format!("using tool: {name}")),
            synthetic: summary.is_none(),
        }),
        AgentEvent::ToolResult { name, summary } => Some(ProgressNote {
            text: summary.clone().unwrap_or_else(|| format!("{name} finished")),
            synthetic: summary.is_none(),
        }),
        AgentEvent::CommandExecution { command } => Some(ProgressNote { text: format!("running: {command}"), synthetic: false }),
        AgentEvent::FileChange { path, summary } => Some(ProgressNote {
            text: summary.clone().unwrap_or_else(|| format!("edited {path}")),
            synthetic: summary.is_none(),
        }),
        AgentEvent::Reasoning { text: Some(text) } => Some(ProgressNote { text: text.clone(), synthetic: false }),
        _ => None,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
