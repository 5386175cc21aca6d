// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One invocation of the child CLI for a single user prompt.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Queued,
    Running,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRun {
    pub status: Option<AgentRunStatus>,
    pub provider: Option<String>,
    pub reason: Option<String>,
    pub queued_at_ms: Option<u64>,
    pub started_at_ms: Option<u64>,
    pub pending_message_id: Option<String>,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    pub last_interrupted_at_ms: Option<u64>,
    pub last_interrupted_reason: Option<String>,
}

impl AgentRun {
    pub fn queue(&mut self, provider: impl Into<String>, now_ms: u64) {
        self.status = Some(AgentRunStatus::Queued);
        self.provider = Some(provider.into());
        self.queued_at_ms = Some(now_ms);
    }

    pub fn start(&mut self, now_ms: u64) {
        self.status = Some(AgentRunStatus::Running);
        self.started_at_ms = Some(now_ms);
    }

    pub fn interrupt(&mut self, reason: impl Into<String>, now_ms: u64) {
        self.last_interrupted_at_ms = Some(now_ms);
        self.last_interrupted_reason = Some(reason.into());
    }

    pub fn clear(&mut self) {
        *self = AgentRun::default();
    }
}

/// A prior in-flight run discovered at load time, reported to the user as
/// a "your previous run was interrupted" post-restart notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRestartNotice {
    pub conversation_key: String,
    pub status: AgentRunStatus,
    pub provider: Option<String>,
}

/// Resets a run left `queued`/`running` across a restart to `null`,
/// returning a notice if one was in flight. Called by the storage
/// normalizer on load.
pub fn reset_on_load(conversation_key: &str, run: &mut AgentRun) -> Option<PostRestartNotice> {
    let notice = run.status.map(|status| PostRestartNotice {
        conversation_key: conversation_key.to_string(),
        status,
        provider: run.provider.clone(),
    });
    run.status = None;
    run.queued_at_ms = None;
    run.started_at_ms = None;
    notice
}

#[cfg(test)]
#[path = "agent_run_tests.rs"]
mod tests;
