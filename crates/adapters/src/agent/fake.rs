// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A scriptable `AgentCliAdapter` for engine-level tests: no subprocess is
//! spawned, queued responses are returned in order.

use super::{AgentCliAdapter, AgentError, AgentRunOutcome, AgentSpawnConfig, ProgressNote};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One scripted response: either a successful outcome (with progress notes
/// to replay through the callback first, and an optional pid to report via
/// `on_spawn`) or an error to return.
pub enum ScriptedRun {
    Ok(AgentRunOutcome, Vec<ProgressNote>, Option<u32>),
    Err(AgentError),
}

pub struct FakeAgentCliAdapter {
    queue: Mutex<VecDeque<ScriptedRun>>,
    calls: Mutex<Vec<AgentSpawnConfig>>,
}

impl FakeAgentCliAdapter {
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()), calls: Mutex::new(Vec::new()) }
    }

    pub fn push_ok(&self, outcome: AgentRunOutcome) {
        self.queue.lock().push_back(ScriptedRun::Ok(outcome, Vec::new(), None));
    }

    pub fn push_ok_with_progress(&self, outcome: AgentRunOutcome, notes: Vec<ProgressNote>) {
        self.queue.lock().push_back(ScriptedRun::Ok(outcome, notes, None));
    }

    pub fn push_ok_with_pid(&self, outcome: AgentRunOutcome, pid: u32) {
        self.queue.lock().push_back(ScriptedRun::Ok(outcome, Vec::new(), Some(pid)));
    }

    pub fn push_err(&self, error: AgentError) {
        self.queue.lock().push_back(ScriptedRun::Err(error));
    }

    pub fn calls(&self) -> Vec<AgentSpawnConfig> {
        self.calls.lock().clone()
    }
}

impl Default for FakeAgentCliAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentCliAdapter for FakeAgentCliAdapter {
    async fn run(
        &self,
        config: AgentSpawnConfig,
        on_progress: &(dyn Fn(ProgressNote) + Send + Sync),
        on_spawn: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<AgentRunOutcome, AgentError> {
        self.calls.lock().push(config.clone());
        match self.queue.lock().pop_front() {
            Some(ScriptedRun::Ok(outcome, notes, pid)) => {
                if let Some(pid) = pid {
                    on_spawn(pid);
                }
                for note in notes {
                    on_progress(note);
                }
                Ok(outcome)
            }
            Some(ScriptedRun::Err(error)) => Err(error),
            None => Ok(AgentRunOutcome::default()),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
