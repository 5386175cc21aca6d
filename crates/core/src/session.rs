// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-conversation aggregate: one `Session` per `ConversationKey`.

use crate::agent_run::{self, AgentRun, PostRestartNotice};
use crate::job::Job;
use crate::plan::Plan;
use crate::research::ResearchBinding;
use crate::task::{self, Task};
use crate::task_loop::TaskLoop;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoToggles {
    pub actions: bool,
    pub research: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub conversation_key: String,
    pub external_session_id: Option<String>,
    pub workdir: std::path::PathBuf,
    pub bootstrap_version: u32,
    pub tasks: Vec<Task>,
    pub task_loop: TaskLoop,
    pub plans: Vec<Plan>,
    pub jobs: Vec<Job>,
    pub auto: AutoToggles,
    pub research: Option<ResearchBinding>,
    pub agent_run: AgentRun,
    pub last_channel_id: Option<String>,
    next_task_seq: u32,
}

impl Session {
    pub fn new(conversation_key: impl Into<String>, workdir: std::path::PathBuf) -> Self {
        Self {
            conversation_key: conversation_key.into(),
            external_session_id: None,
            workdir,
            bootstrap_version: 0,
            tasks: Vec::new(),
            task_loop: TaskLoop::default(),
            plans: Vec::new(),
            jobs: Vec::new(),
            auto: AutoToggles::default(),
            research: None,
            agent_run: AgentRun::default(),
            last_channel_id: None,
            next_task_seq: 1,
        }
    }

    /// The invariant from §3: at most one task per session has status
    /// `Running`.
    pub fn running_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == task::TaskStatus::Running)
    }

    pub fn running_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.status == task::TaskStatus::Running)
    }

    pub fn first_pending_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.status == task::TaskStatus::Pending)
    }

    pub fn allocate_task_id(&mut self) -> String {
        let id = Task::format_id(self.next_task_seq);
        self.next_task_seq += 1;
        id
    }

    /// The invariant from §3: at most one job per session has status
    /// `Running`.
    pub fn running_job(&self) -> Option<&Job> {
        self.jobs.iter().find(|j| j.status == crate::job::JobStatus::Running)
    }

    pub fn running_job_mut(&mut self) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.status == crate::job::JobStatus::Running)
    }

    pub fn find_job_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == job_id)
    }

    /// Reset pass applied on load: demotes running tasks, resets the task
    /// loop, and clears any in-flight agent run, collecting a notice.
    pub fn normalize_on_load(&mut self) -> Option<PostRestartNotice> {
        for t in &mut self.tasks {
            task::demote_interrupted_task(t);
        }
        self.task_loop.reset_on_load();
        agent_run::reset_on_load(&self.conversation_key, &mut self.agent_run)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
