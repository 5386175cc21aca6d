// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component J: the `/ask` priority-question interrupt. Pauses the active
//! child's process tree (if one is running), answers the question through a
//! separate ephemeral agent invocation that never touches the PCQ, then
//! resumes the paused tree. Deliberately does not reuse [`crate::runner::AgentRunner`]:
//! `/ask` is specified to bypass the queue entirely, not to jump it.

use crate::attachments::{truncate_text, TruncationMode};
use crate::interrupt_buffer::InterruptSnapshotBuffer;
use crate::runner::{chunk_for_chat, CHAT_CHAR_LIMIT};
use crate::EngineError;
use parking_lot::Mutex;
use relay_adapters::{signals, AgentCliAdapter, AgentSpawnConfig, ChatTransport, OutboundMessage, Provider};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// How many trailing chars of an inferred run-log file are handed to the
/// ephemeral agent as context.
const LOG_EXCERPT_BUDGET: usize = 6_000;

/// Tracks in-flight priority questions (for the refuse-if-busy check) and the
/// pids a question has paused, per conversation, so they can be resumed
/// exactly once the answer is ready or the attempt fails.
#[derive(Default)]
pub struct PriorityQuestionState {
    in_flight: Mutex<HashSet<String>>,
    paused_pids: Mutex<HashMap<String, Vec<i32>>>,
}

impl PriorityQuestionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this conversation successfully claimed the
    /// in-flight slot; `false` means another `/ask` is already running.
    fn try_begin(&self, conversation_key: &str) -> bool {
        self.in_flight.lock().insert(conversation_key.to_string())
    }

    fn end(&self, conversation_key: &str) {
        self.in_flight.lock().remove(conversation_key);
    }

    fn record_paused(&self, conversation_key: &str, pids: Vec<i32>) {
        self.paused_pids.lock().insert(conversation_key.to_string(), pids);
    }

    fn take_paused(&self, conversation_key: &str) -> Vec<i32> {
        self.paused_pids.lock().remove(conversation_key).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub conversation_key: String,
    pub channel_id: String,
    pub question: String,
    pub provider: Provider,
    pub workdir: PathBuf,
    /// Root pid of the active child's process tree, if a request is
    /// currently running for this conversation. `None` means the queue is
    /// idle and there is nothing to pause.
    pub active_root_pid: Option<i32>,
    /// Caller-supplied one-line-per-job summaries (component H/I own the
    /// `Job` records; this module only renders whatever the caller hands
    /// it).
    pub job_summaries: Vec<String>,
    /// The run-log path candidate chosen by the caller, already prioritized
    /// per "explicit job logPath > inferred require-file > progress-text
    /// mentioned path" — see [`pick_log_path`].
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSnapshot {
    pub recent_progress: Vec<String>,
    pub job_summaries: Vec<String>,
    pub log_excerpt: Option<String>,
}

/// Picks the run-log path candidate per the documented priority order:
/// an explicit job `logPath` wins, then a require-file inferred from the
/// running command, then a path mentioned in recent progress text.
pub fn pick_log_path<'a>(
    explicit_job_log_path: Option<&'a Path>,
    inferred_require_file: Option<&'a Path>,
    progress_mentioned_log: Option<&'a Path>,
) -> Option<&'a Path> {
    explicit_job_log_path.or(inferred_require_file).or(progress_mentioned_log)
}

/// Scans `progress_lines` for the last mentioned path ending in `.log`, for
/// use as the lowest-priority `pick_log_path` candidate.
pub fn infer_log_path_from_progress(progress_lines: &[String]) -> Option<PathBuf> {
    progress_lines.iter().rev().find_map(|line| {
        line.split_whitespace()
            .find(|token| token.ends_with(".log"))
            .map(|token| PathBuf::from(token.trim_matches(|c| c == '(' || c == ')' || c == ',' || c == '"')))
    })
}

fn build_run_snapshot(buffer: &InterruptSnapshotBuffer, conversation_key: &str, recent_lines: usize, job_summaries: Vec<String>, log_path: Option<&Path>) -> RunSnapshot {
    let recent_progress = buffer.recent(conversation_key, recent_lines);
    let log_excerpt = log_path.and_then(|path| std::fs::read_to_string(path).ok()).map(|text| truncate_text(&text, LOG_EXCERPT_BUDGET, TruncationMode::Tail));
    RunSnapshot { recent_progress, job_summaries, log_excerpt }
}

fn render_snapshot_prompt(question: &str, snapshot: &RunSnapshot) -> String {
    let mut sections = Vec::new();
    sections.push(format!("Priority question: {question}"));
    sections.push("Answer using only the context below; do not resume or modify the run.".to_string());

    if !snapshot.recent_progress.is_empty() {
        sections.push(format!("Recent progress:\n{}", snapshot.recent_progress.join("\n")));
    }
    if !snapshot.job_summaries.is_empty() {
        sections.push(format!("Jobs:\n{}", snapshot.job_summaries.join("\n")));
    }
    if let Some(excerpt) = &snapshot.log_excerpt {
        sections.push(format!("Run log (tail):\n{excerpt}"));
    }
    sections.join("\n\n")
}

/// Drives one `/ask` request end to end: refuse-if-busy, pause, snapshot,
/// ephemeral answer, edit, resume.
pub struct PriorityQuestionRunner {
    pub adapter: Arc<dyn AgentCliAdapter>,
    pub transport: Arc<dyn ChatTransport>,
    pub interrupt_buffer: Arc<InterruptSnapshotBuffer>,
    pub state: Arc<PriorityQuestionState>,
    pub snapshot_recent_lines: usize,
}

impl PriorityQuestionRunner {
    pub async fn ask(&self, request: AskRequest) -> Result<(), EngineError> {
        if !self.state.try_begin(&request.conversation_key) {
            return Err(EngineError::PriorityQuestionBusy(request.conversation_key));
        }

        let result = self.ask_inner(&request).await;

        // Step 7: always reverse the pause, whether we succeeded or not.
        self.resume_paused(&request.conversation_key);
        self.state.end(&request.conversation_key);
        result
    }

    async fn ask_inner(&self, request: &AskRequest) -> Result<(), EngineError> {
        let message_id = self
            .transport
            .send_message(OutboundMessage { channel_id: request.channel_id.clone(), text: "Handling priority question...".to_string() })
            .await
            .map_err(EngineError::Transport)?;

        if let Some(root_pid) = request.active_root_pid {
            let order = signals::stop_order(root_pid);
            let mut paused = Vec::with_capacity(order.len());
            for pid in order {
                if signals::stop_pid(pid).is_ok() {
                    paused.push(pid);
                }
            }
            self.state.record_paused(&request.conversation_key, paused);
        }

        let snapshot = build_run_snapshot(
            self.interrupt_buffer.as_ref(),
            &request.conversation_key,
            self.snapshot_recent_lines,
            request.job_summaries.clone(),
            request.log_path.as_deref(),
        );
        let prompt = render_snapshot_prompt(&request.question, &snapshot);

        let mut config = AgentSpawnConfig::new(request.provider, prompt, request.workdir.clone());
        config.ephemeral = true;
        if matches!(request.provider, Provider::Codex) {
            config.sandbox_mode = Some("read-only".to_string());
        }
        // Claude side: leaving `resume_session_id` unset (the default on a
        // freshly built config) is exactly "a fresh session id".

        let no_op = |_note: relay_adapters::ProgressNote| {};
        let no_op_spawn = |_pid: u32| {};
        let outcome = match self.adapter.run(config, &no_op, &no_op_spawn).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let _ = self.transport.edit_message(&request.channel_id, &message_id, &format!("Priority question failed: {err}")).await;
                return Err(EngineError::Agent(err));
            }
        };

        let chunks = chunk_for_chat(&outcome.final_text, CHAT_CHAR_LIMIT);
        let first = chunks.first().cloned().unwrap_or_default();
        self.transport.edit_message(&request.channel_id, &message_id, &first).await.map_err(EngineError::Transport)?;
        for extra in chunks.iter().skip(1) {
            self.transport
                .send_message(OutboundMessage { channel_id: request.channel_id.clone(), text: extra.clone() })
                .await
                .map_err(EngineError::Transport)?;
        }

        Ok(())
    }

    fn resume_paused(&self, conversation_key: &str) {
        let pids = self.state.take_paused(conversation_key);
        if pids.is_empty() {
            return;
        }
        let mut any_failed = false;
        for pid in pids {
            if signals::continue_pid(pid).is_err() {
                any_failed = true;
            }
        }
        if any_failed {
            warn!(conversation_key, "failed to resume one or more paused processes after /ask; they may still be stopped");
        }
    }
}

#[cfg(test)]
#[path = "priority_question_tests.rs"]
mod tests;
