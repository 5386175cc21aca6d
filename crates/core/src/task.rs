// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session task queue entries (the "Ralph loop" work items).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Blocked,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub created_at_ms: u64,
    pub started_at_ms: Option<u64>,
    pub finished_at_ms: Option<u64>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_result_preview: Option<String>,
    pub source_job_id: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, prompt: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            prompt: prompt.into(),
            status: TaskStatus::Pending,
            created_at_ms,
            started_at_ms: None,
            finished_at_ms: None,
            attempts: 0,
            last_error: None,
            last_result_preview: None,
            source_job_id: None,
        }
    }

    pub fn with_source_job(mut self, job_id: impl Into<String>) -> Self {
        self.source_job_id = Some(job_id.into());
        self
    }

    pub fn start(&mut self, now_ms: u64) {
        self.status = TaskStatus::Running;
        self.started_at_ms = Some(now_ms);
        self.attempts += 1;
    }

    pub fn finish_done(&mut self, now_ms: u64, result_preview: impl Into<String>) {
        self.status = TaskStatus::Done;
        self.finished_at_ms = Some(now_ms);
        self.last_result_preview = Some(result_preview.into());
    }

    pub fn finish_blocked(&mut self, now_ms: u64, result_preview: impl Into<String>) {
        self.status = TaskStatus::Blocked;
        self.finished_at_ms = Some(now_ms);
        self.last_result_preview = Some(result_preview.into());
    }

    pub fn finish_failed(&mut self, now_ms: u64, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.finished_at_ms = Some(now_ms);
        self.last_error = Some(error.into());
    }

    pub fn cancel(&mut self, now_ms: u64) {
        self.status = TaskStatus::Canceled;
        self.finished_at_ms = Some(now_ms);
    }

    /// Formats the stable task id, `t-%04d`, matching the source's numbering.
    pub fn format_id(seq: u32) -> String {
        format!("t-{seq:04}")
    }
}

/// Demotes a task left `Running` across a restart back to `Pending`,
/// recording why. Called by the storage normalizer on load.
pub fn demote_interrupted_task(task: &mut Task) {
    if task.status == TaskStatus::Running {
        task.status = TaskStatus::Pending;
        task.last_error = Some("interrupted by restart".to_string());
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
