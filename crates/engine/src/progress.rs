// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component D: the progress reporter. Owns exactly one "status message" in
//! chat per agent run, throttled to `min_edit_ms` between content-driven
//! edits and forced at least once per `heartbeat_ms`. Separate from the
//! interrupt-snapshot buffer per Design Notes (Open Question 4): this type
//! only drives the visible status message; [`crate::interrupt_buffer::InterruptSnapshotBuffer`]
//! is what `/ask` reads from.

use crate::interrupt_buffer::InterruptSnapshotBuffer;
use parking_lot::Mutex;
use relay_adapters::{ChatTransport, TransportError};
use relay_core::time_fmt::format_elapsed_ms;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// One line of normalized orchestrator text a milestone post is allowed to
/// start with; anything matching these prefixes (case-insensitive) is
/// considered low-signal and dropped from persistent milestone posts.
const FORBIDDEN_MILESTONE_PREFIXES: &[&str] = &["thinking:", "running...", "note:", "debug:"];

#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub min_edit: Duration,
    pub heartbeat: Duration,
    pub edit_timeout: Duration,
    pub stall_warn: Duration,
    pub max_lines: usize,
    pub agent_label: String,
    pub timeout_label: Duration,
}

struct MilestoneGate {
    min_len: usize,
    max_len: usize,
    last_milestone_ms: Option<u64>,
    last_orchestrator_ms: Option<u64>,
}

impl MilestoneGate {
    fn new() -> Self {
        Self { min_len: 12, max_len: 500, last_milestone_ms: None, last_orchestrator_ms: None }
    }

    fn normalize(text: &str) -> Option<String> {
        let t = text.trim();
        let lower = t.to_lowercase();
        if FORBIDDEN_MILESTONE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return None;
        }
        if t.len() < 1 {
            return None;
        }
        Some(t.to_string())
    }

    /// Adaptive backoff: the minimum interval between milestone posts grows
    /// with elapsed run time, capped at 10x the base interval.
    fn backoff(base_ms: u64, elapsed_ms: u64) -> u64 {
        let scale = 1 + (elapsed_ms / 60_000).min(9);
        base_ms * scale
    }

    /// Decides whether `text` may be posted as a persistent milestone right
    /// now, given `now_ms`/`elapsed_ms` and a base rate-limit interval.
    fn allow(&mut self, text: &str, now_ms: u64, elapsed_ms: u64, base_interval_ms: u64, is_orchestrator_style: bool) -> Option<String> {
        let normalized = Self::normalize(text)?;
        if normalized.len() < self.min_len {
            return None;
        }
        let truncated = if normalized.len() > self.max_len {
            format!("{}…", &normalized[..self.max_len])
        } else {
            normalized
        };

        let last = if is_orchestrator_style { self.last_orchestrator_ms } else { self.last_milestone_ms };
        let min_gap = Self::backoff(base_interval_ms, elapsed_ms);
        if let Some(last) = last {
            if now_ms.saturating_sub(last) < min_gap {
                return None;
            }
        }
        if is_orchestrator_style {
            self.last_orchestrator_ms = Some(now_ms);
        } else {
            self.last_milestone_ms = Some(now_ms);
        }
        Some(truncated)
    }
}

struct ReporterState {
    ring: VecDeque<String>,
    last_non_synthetic_ms: u64,
    last_edit_ms: u64,
    dirty: bool,
    stopped: bool,
    stall_warned_since_last_event: bool,
    pending_milestones: Vec<String>,
    milestone_gate: MilestoneGate,
}

/// Owns one chat "status message" for the lifetime of an agent run.
pub struct ProgressReporter {
    conversation_key: String,
    channel_id: String,
    message_id: String,
    started_ms: u64,
    config: ProgressConfig,
    state: Mutex<ReporterState>,
    buffer: Arc<InterruptSnapshotBuffer>,
}

impl ProgressReporter {
    pub fn new(
        conversation_key: impl Into<String>,
        channel_id: impl Into<String>,
        message_id: impl Into<String>,
        started_ms: u64,
        config: ProgressConfig,
        buffer: Arc<InterruptSnapshotBuffer>,
    ) -> Self {
        let ring_capacity = config.max_lines.saturating_mul(3).max(3);
        Self {
            conversation_key: conversation_key.into(),
            channel_id: channel_id.into(),
            message_id: message_id.into(),
            started_ms,
            config,
            state: Mutex::new(ReporterState {
                ring: VecDeque::with_capacity(ring_capacity),
                last_non_synthetic_ms: started_ms,
                last_edit_ms: 0,
                dirty: true,
                stopped: false,
                stall_warned_since_last_event: false,
                pending_milestones: Vec::new(),
                milestone_gate: MilestoneGate::new(),
            }),
            buffer,
        }
    }

    /// Records one progress line. Never suspends: the actual chat edit is
    /// driven separately by [`Self::tick`].
    pub fn note(&self, text: impl Into<String>, now_ms: u64, synthetic: bool, persist: bool) {
        let text = text.into();
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        let ring_capacity = self.config.max_lines.saturating_mul(3).max(3);
        if state.ring.len() >= ring_capacity {
            state.ring.pop_front();
        }
        state.ring.push_back(text.clone());
        state.dirty = true;
        if !synthetic {
            state.last_non_synthetic_ms = now_ms;
            state.stall_warned_since_last_event = false;
        }
        if persist {
            state.pending_milestones.push(text.clone());
        }
        drop(state);
        self.buffer.push(&self.conversation_key, text);
    }

    fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_ms)
    }

    /// Injects a synthetic stall warning if no non-synthetic note has
    /// arrived for `stall_warn` and one hasn't already been injected for
    /// this stall period.
    fn maybe_note_stall(&self, now_ms: u64) {
        let should_warn = {
            let state = self.state.lock();
            let idle = now_ms.saturating_sub(state.last_non_synthetic_ms);
            idle >= self.config.stall_warn.as_millis() as u64 && !state.stall_warned_since_last_event
        };
        if should_warn {
            let idle_label = format_elapsed_ms(now_ms.saturating_sub(self.state.lock().last_non_synthetic_ms));
            self.note(format!("no new agent events for {idle_label}"), now_ms, true, false);
            self.state.lock().stall_warned_since_last_event = true;
        }
    }

    /// Renders the current status message template.
    pub fn render(&self, now_ms: u64) -> String {
        let state = self.state.lock();
        let elapsed = format_elapsed_ms(self.elapsed_ms(now_ms));
        let timeout_label = if self.config.timeout_label.is_zero() {
            "disabled".to_string()
        } else {
            format_elapsed_ms(self.config.timeout_label.as_millis() as u64)
        };
        let last_event = format_elapsed_ms(now_ms.saturating_sub(state.last_non_synthetic_ms));
        let header = format!(
            "Running {}... (elapsed {} | timeout {} | last event {} ago)",
            self.config.agent_label, elapsed, timeout_label, last_event
        );
        let visible: Vec<&String> = state.ring.iter().rev().take(self.config.max_lines).collect();
        let mut lines: Vec<String> = visible.into_iter().rev().map(|l| format!("- {l}")).collect();
        if lines.is_empty() {
            lines.push("- (no progress yet)".to_string());
        }
        format!("{header}\n{}", lines.join("\n"))
    }

    /// One scheduler tick: warns on stall, decides whether the status
    /// message needs editing (forced every `heartbeat`, otherwise throttled
    /// to `min_edit`), and flushes any queued milestone posts. Transport
    /// errors are logged and swallowed: per the error taxonomy, a dropped
    /// status edit does not fail the run.
    pub async fn tick(&self, transport: &dyn ChatTransport, now_ms: u64) {
        self.maybe_note_stall(now_ms);

        let should_edit = {
            let state = self.state.lock();
            let since_edit = now_ms.saturating_sub(state.last_edit_ms);
            since_edit >= self.config.heartbeat.as_millis() as u64
                || (state.dirty && since_edit >= self.config.min_edit.as_millis() as u64)
        };

        if should_edit {
            let rendered = self.render(now_ms);
            match timeout(self.config.edit_timeout, transport.edit_message(&self.channel_id, &self.message_id, &rendered)).await {
                Ok(Ok(())) => {
                    let mut state = self.state.lock();
                    state.dirty = false;
                    state.last_edit_ms = now_ms;
                }
                Ok(Err(err)) => warn!(error = %err, "progress reporter edit failed"),
                Err(_) => warn!("progress reporter edit timed out"),
            }
        }

        self.flush_milestones(transport, now_ms).await;
    }

    async fn flush_milestones(&self, transport: &dyn ChatTransport, now_ms: u64) {
        let pending: Vec<String> = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.pending_milestones)
        };
        let elapsed_ms = self.elapsed_ms(now_ms);
        for line in pending {
            let is_orchestrator_style = line.to_lowercase().starts_with("thinking");
            let allowed = {
                let mut state = self.state.lock();
                state.milestone_gate.allow(&line, now_ms, elapsed_ms, self.config.min_edit.as_millis() as u64 * 4, is_orchestrator_style)
            };
            if let Some(text) = allowed {
                if let Err(err) = transport.send_message(relay_adapters::OutboundMessage { channel_id: self.channel_id.clone(), text }).await {
                    warn!(error = %err, "milestone post failed");
                }
            }
        }
    }

    /// Final flush and shutdown: always performs one last edit regardless
    /// of throttling, then marks the reporter stopped.
    pub async fn stop(&self, transport: &dyn ChatTransport, now_ms: u64, final_text: Option<&str>) -> Result<(), TransportError> {
        let rendered = final_text.map(str::to_string).unwrap_or_else(|| self.render(now_ms));
        let result = timeout(self.config.edit_timeout, transport.edit_message(&self.channel_id, &self.message_id, &rendered))
            .await
            .map_err(|_| TransportError::Timeout)
            .and_then(|inner| inner);
        self.state.lock().stopped = true;
        result
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
