// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component F: the agent runner. Ties the PCQ, progress reporter, context
//! bootstrap, attachment ingest, and retry policies together into the
//! ten-step request contract.

use crate::bootstrap::{build_bootstrap_block, needs_bootstrap, BootstrapConfig, CURRENT_BOOTSTRAP_VERSION};
use crate::interrupt_buffer::InterruptSnapshotBuffer;
use crate::pcq::{Pcq, Skipped};
use crate::progress::{ProgressConfig, ProgressReporter};
use crate::retry::{apply_fallback_model, apply_stale_session_rerun, decide, AgentAwareConfig, RetryAction, RetryBudget};
use crate::EngineError;
use parking_lot::Mutex as SyncMutex;
use relay_adapters::{AgentCliAdapter, AgentError, AgentRunOutcome, AgentSpawnConfig, ChatTransport, OutboundMessage, Provider};
use relay_core::clock::Clock;
use relay_core::markers::{self, Marker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Per-conversation registry of the active child's pid, the `Map<convKey,
/// childHandle>` the cancellation and priority-question paths need for
/// signal delivery. Populated by [`AgentRunner::run`] as soon as the child
/// is spawned and cleared once the run (including retries) finishes;
/// shared between the runner that populates it and the daemon dispatch
/// code that reads it for `/ask` and `/inject`.
#[derive(Clone, Default)]
pub struct ActivePids(Arc<SyncMutex<HashMap<String, u32>>>);

impl ActivePids {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, conversation_key: &str, pid: u32) {
        self.0.lock().insert(conversation_key.to_string(), pid);
    }

    fn clear(&self, conversation_key: &str) {
        self.0.lock().remove(conversation_key);
    }

    /// The tracked pid for `conversation_key`, if a child is currently
    /// running for it.
    pub fn get(&self, conversation_key: &str) -> Option<i32> {
        self.0.lock().get(conversation_key).map(|pid| *pid as i32)
    }

    /// Seeds the registry directly, for exercising `/ask`/`/inject` without
    /// a real running child.
    #[cfg(any(test, feature = "test-support"))]
    pub fn set_for_test(&self, conversation_key: &str, pid: u32) {
        self.set(conversation_key, pid);
    }
}

/// Discord's message character cap; final replies are chunked to this.
pub(crate) const CHAT_CHAR_LIMIT: usize = 2000;
const TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Bound on how many `[[relay-actions]]` blocks a single reply may carry.
const MAX_ACTION_BLOCKS_PER_REPLY: usize = 4;

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub conversation_key: String,
    pub channel_id: String,
    pub provider: Provider,
    pub prompt: String,
    pub resume_session_id: Option<String>,
    pub workdir: std::path::PathBuf,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: Option<String>,
    pub reply_chunks: Vec<String>,
    pub markers: Vec<Marker>,
    pub bumped_bootstrap: bool,
    pub retried: bool,
}

/// Everything the runner needs besides the per-request details: the
/// collaborators it was constructed with once at daemon startup.
pub struct AgentRunner {
    pub adapter: Arc<dyn AgentCliAdapter>,
    pub transport: Arc<dyn ChatTransport>,
    pub pcq: Arc<Pcq>,
    pub interrupt_buffer: Arc<InterruptSnapshotBuffer>,
    pub clock: Arc<dyn Clock>,
    pub retry_config: AgentAwareConfig,
    pub progress_config: ProgressConfig,
    pub active_pids: ActivePids,
}

impl AgentRunner {
    /// Runs one request through the full ten-step contract. `session_bootstrap_version`
    /// and `bootstrap` describe the caller's current session bootstrap
    /// state; the caller is responsible for persisting the returned
    /// `bumped_bootstrap`/`session_id` back onto its `Session`.
    pub async fn run(
        &self,
        request: RunRequest,
        session_bootstrap_version: u32,
        bootstrap: &BootstrapConfig,
    ) -> Result<RunOutcome, EngineError> {
        let now_ms = self.clock.epoch_ms();

        // Step 1: post "Running..." and create the progress reporter.
        let message_id = self
            .transport
            .send_message(OutboundMessage {
                channel_id: request.channel_id.clone(),
                text: format!("Running {}...", request.provider.as_str()),
            })
            .await
            .map_err(|err| EngineError::Transport(err))?;

        let reporter = Arc::new(ProgressReporter::new(
            request.conversation_key.clone(),
            request.channel_id.clone(),
            message_id.clone(),
            now_ms,
            self.progress_config.clone(),
            self.interrupt_buffer.clone(),
        ));

        // Step 2: enqueue on the PCQ.
        let submission_epoch = self.pcq.current_epoch(&request.conversation_key);
        let transport = self.transport.clone();
        let adapter = self.adapter.clone();
        let clock = self.clock.clone();
        let retry_config = self.retry_config.clone();
        let reporter_for_task = reporter.clone();

        let bumped_bootstrap = needs_bootstrap(session_bootstrap_version);
        let mut prompt = request.prompt.clone();
        if bumped_bootstrap {
            prompt = format!("{}\n\n{prompt}", build_bootstrap_block(bootstrap));
        }

        let conversation_key = request.conversation_key.clone();
        let provider = request.provider;
        let workdir = request.workdir.clone();
        let resume_session_id = request.resume_session_id.clone();
        let model = request.model.clone();
        let active_pids = self.active_pids.clone();
        let pid_key = conversation_key.clone();

        let result = self
            .pcq
            .submit(&conversation_key, submission_epoch, move || async move {
                let on_spawn = move |pid: u32| active_pids.set(&pid_key, pid);
                run_with_retries(
                    adapter,
                    transport,
                    reporter_for_task,
                    clock,
                    &retry_config,
                    provider,
                    prompt,
                    resume_session_id,
                    workdir,
                    model,
                    &on_spawn,
                )
                .await
            })
            .await;

        // The child, if any was spawned, has exited by the time `submit`
        // resolves (success, failure, or preemption never starting one).
        self.active_pids.clear(&conversation_key);

        let (outcome, retried) = match result {
            Ok(inner) => inner?,
            Err(Skipped::Preempted) => {
                reporter.stop(self.transport.as_ref(), self.clock.epoch_ms(), Some("Canceled: superseded by a newer request.")).await.ok();
                return Err(EngineError::NoRunningJob("request preempted before it ran".to_string()));
            }
        };

        // Steps 7-8: extract markers, chunk the reply, stop the reporter.
        let tokenized = markers::tokenize(&outcome.final_text, false);
        let action_blocks = tokenized.markers.iter().filter(|m| matches!(m, Marker::RelayActions { .. })).count();
        if action_blocks > MAX_ACTION_BLOCKS_PER_REPLY {
            warn!(action_blocks, "dropping relay-action blocks beyond the per-reply budget");
        }

        let reply_chunks = chunk_for_chat(&tokenized.cleaned_text, CHAT_CHAR_LIMIT);
        let final_text = reply_chunks.first().cloned().unwrap_or_default();
        reporter.stop(self.transport.as_ref(), self.clock.epoch_ms(), Some(&final_text)).await.map_err(EngineError::Transport)?;
        for extra in reply_chunks.iter().skip(1) {
            self.transport
                .send_message(OutboundMessage { channel_id: request.channel_id.clone(), text: extra.clone() })
                .await
                .map_err(EngineError::Transport)?;
        }

        Ok(RunOutcome {
            session_id: outcome.session_id,
            reply_chunks,
            markers: tokenized.markers,
            bumped_bootstrap,
            retried,
        })
    }
}

/// Runs the adapter, applying §4.F step 5's ordered retry policies on
/// failure until a layer gives up or succeeds.
#[allow(clippy::too_many_arguments)]
async fn run_with_retries(
    adapter: Arc<dyn AgentCliAdapter>,
    transport: Arc<dyn ChatTransport>,
    reporter: Arc<ProgressReporter>,
    clock: Arc<dyn Clock>,
    retry_config: &AgentAwareConfig,
    provider: Provider,
    prompt: String,
    resume_session_id: Option<String>,
    workdir: std::path::PathBuf,
    model: Option<String>,
    on_spawn: &(dyn Fn(u32) + Send + Sync),
) -> Result<(AgentRunOutcome, bool), EngineError> {
    let mut config = AgentSpawnConfig::new(provider, prompt, workdir);
    config.resume_session_id = resume_session_id;
    config.model = model;

    let mut budget = RetryBudget::default();
    let mut retried = false;

    loop {
        let outcome = run_once(adapter.clone(), transport.clone(), reporter.clone(), clock.clone(), config.clone(), on_spawn).await;
        match outcome {
            Ok(outcome) => return Ok((outcome, retried)),
            Err(error) => {
                let action = decide(&error, retry_config, &mut budget);
                match action {
                    RetryAction::ClearSessionAndRerun { preface } => {
                        apply_stale_session_rerun(&mut config, preface);
                        retried = true;
                    }
                    RetryAction::RerunSameArgs | RetryAction::RerunTransient => {
                        retried = true;
                    }
                    RetryAction::RerunWithFallbackModel { fallback_model } => {
                        apply_fallback_model(&mut config, fallback_model);
                        retried = true;
                    }
                    RetryAction::GiveUp => return Err(EngineError::Agent(error)),
                }
            }
        }
    }
}

/// Runs the adapter exactly once, driving the progress reporter's ticker
/// on a background task for the duration of the call.
async fn run_once(
    adapter: Arc<dyn AgentCliAdapter>,
    transport: Arc<dyn ChatTransport>,
    reporter: Arc<ProgressReporter>,
    clock: Arc<dyn Clock>,
    config: AgentSpawnConfig,
    on_spawn: &(dyn Fn(u32) + Send + Sync),
) -> Result<AgentRunOutcome, AgentError> {
    let stop = Arc::new(AtomicBool::new(false));
    let ticker = {
        let reporter = reporter.clone();
        let clock = clock.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                reporter.tick(transport.as_ref(), clock.epoch_ms()).await;
                tokio::time::sleep(TICK_INTERVAL).await;
            }
        })
    };

    let progress_reporter = reporter.clone();
    let progress_clock = clock.clone();
    let on_progress = move |note: relay_adapters::ProgressNote| {
        progress_reporter.note(note.text, progress_clock.epoch_ms(), note.synthetic, false);
    };

    let result = adapter.run(config, &on_progress, on_spawn).await;
    stop.store(true, Ordering::Relaxed);
    ticker.abort();
    result
}

/// Splits `text` into chunks no longer than `limit` chars, breaking on
/// line boundaries where possible so a chunk never splits mid-line unless
/// a single line itself exceeds the limit.
pub fn chunk_for_chat(text: &str, limit: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if line.chars().count() > limit {
            for piece in hard_split(line, limit) {
                chunks.push(piece);
            }
            continue;
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

fn hard_split(line: &str, limit: usize) -> Vec<String> {
    line.chars()
        .collect::<Vec<_>>()
        .chunks(limit)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
