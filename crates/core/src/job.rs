// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background job records: detached shell processes tracked independently
//! of the agent run that launched them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle log entries are capped; beyond this the oldest are dropped.
/// Generalizes the teacher's step-visit circuit breaker to a simple bound
/// on how much lifecycle history one job carries.
pub const MAX_LIFECYCLE_ENTRIES: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    Canceled,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnMissing {
    Block,
    Enqueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupSmokePolicy {
    KeepAll,
    KeepManifestOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorGate {
    pub supervisor_mode: String,
    pub supervisor_state_file: PathBuf,
    pub supervisor_expect_status: String,
    pub supervisor_cleanup_smoke_policy: CleanupSmokePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub every_sec: u64,
    pub tail_lines: usize,
    pub then_task: Option<String>,
    pub then_task_description: Option<String>,
    pub run_tasks: bool,
    pub require_files: Vec<PathBuf>,
    pub ready_timeout_sec: u64,
    pub ready_poll_sec: u64,
    pub on_missing: OnMissing,
    pub long: bool,
    pub first_post_regex: Option<String>,
    pub supervisor_gate: Option<SupervisorGate>,
}

impl WatchConfig {
    /// Minimal watch config: only polling cadence and tail size set.
    pub fn minimal(every_sec: u64, tail_lines: usize) -> Self {
        Self {
            every_sec: every_sec.max(1),
            tail_lines: tail_lines.max(1),
            then_task: None,
            then_task_description: None,
            run_tasks: false,
            require_files: Vec::new(),
            ready_timeout_sec: 0,
            ready_poll_sec: 1,
            on_missing: OnMissing::Block,
            long: false,
            first_post_regex: None,
            supervisor_gate: None,
        }
    }

    pub fn has_artifact_gate(&self) -> bool {
        !self.require_files.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLifecycleEntry {
    pub state: String,
    pub at_ms: u64,
    pub reason: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPaths {
    pub job_dir: PathBuf,
    pub log_path: PathBuf,
    pub exit_code_path: PathBuf,
    pub pid_path: PathBuf,
}

impl JobPaths {
    pub fn under(job_dir: PathBuf) -> Self {
        Self {
            log_path: job_dir.join("job.log"),
            exit_code_path: job_dir.join("exit_code"),
            pid_path: job_dir.join("pid"),
            job_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJobMeta {
    pub project_root: PathBuf,
    pub run_id: String,
    pub run_dir: PathBuf,
    pub stdout_path: PathBuf,
    pub metrics_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    pub description: Option<String>,
    pub workdir: PathBuf,
    pub status: JobStatus,
    pub started_at_ms: u64,
    pub finished_at_ms: Option<u64>,
    pub exited_at_ms: Option<u64>,
    pub pid: Option<u32>,
    pub paths: JobPaths,
    pub exit_code: Option<i32>,
    pub watch: WatchConfig,
    pub lifecycle: Vec<JobLifecycleEntry>,
    pub visibility: Visibility,
    pub last_heartbeat_ms: Option<u64>,
    pub research: Option<ResearchJobMeta>,
}

/// Command strings are size-limited before a job is allowed to launch.
pub const MAX_COMMAND_LEN: usize = 8 * 1024;

impl Job {
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        workdir: PathBuf,
        job_dir: PathBuf,
        watch: WatchConfig,
        now_ms: u64,
    ) -> Self {
        let mut job = Self {
            id: id.into(),
            command: command.into(),
            description: None,
            workdir,
            status: JobStatus::Running,
            started_at_ms: now_ms,
            finished_at_ms: None,
            exited_at_ms: None,
            pid: None,
            paths: JobPaths::under(job_dir),
            exit_code: None,
            watch,
            lifecycle: Vec::new(),
            visibility: Visibility::Ok,
            last_heartbeat_ms: None,
            research: None,
        };
        job.push_lifecycle("queued", now_ms, None);
        job.push_lifecycle("running", now_ms, None);
        job
    }

    /// Appends a lifecycle transition, dropping the oldest entry if the
    /// bounded log is full.
    pub fn push_lifecycle(&mut self, state: impl Into<String>, at_ms: u64, reason: Option<String>) {
        self.lifecycle.push(JobLifecycleEntry {
            state: state.into(),
            at_ms,
            reason,
            details: None,
        });
        while self.lifecycle.len() > MAX_LIFECYCLE_ENTRIES {
            self.lifecycle.remove(0);
        }
    }

    /// Derives terminal status from an observed exit code, honoring the
    /// "exit-code file is ground truth" invariant. Statuses forced to
    /// `Canceled`/`Blocked` are never overwritten by this call.
    pub fn finalize_from_exit_code(&mut self, exit_code: i32, now_ms: u64) {
        if matches!(self.status, JobStatus::Canceled | JobStatus::Blocked) {
            return;
        }
        self.exit_code = Some(exit_code);
        self.exited_at_ms = Some(now_ms);
        self.status = if exit_code == 0 { JobStatus::Done } else { JobStatus::Failed };
        self.finished_at_ms = Some(now_ms);
        self.push_lifecycle(
            if exit_code == 0 { "done" } else { "failed" },
            now_ms,
            Some(format!("exit_code={exit_code}")),
        );
    }

    pub fn mark_blocked(&mut self, reason: impl Into<String>, now_ms: u64) {
        self.status = JobStatus::Blocked;
        self.finished_at_ms = Some(now_ms);
        let reason = reason.into();
        self.push_lifecycle("blocked", now_ms, Some(reason));
    }

    pub fn mark_canceled(&mut self, now_ms: u64) {
        self.status = JobStatus::Canceled;
        self.finished_at_ms = Some(now_ms);
        self.push_lifecycle("canceled", now_ms, None);
    }

    /// True if the job is running per last known status but has neither a
    /// live leader nor an exit-code file — the "unknown" state from the
    /// durability invariant, which must not be reported as done.
    pub fn is_unknown(&self, leader_alive: bool, exit_code_file_exists: bool) -> bool {
        self.status == JobStatus::Running && !leader_alive && !exit_code_file_exists
    }

    /// Allocates the job id shape `j-YYYYMMDD-HHMMSS-rand`.
    pub fn format_id(date_stamp: &str, time_stamp: &str, rand_suffix: &str) -> String {
        format!("j-{date_stamp}-{time_stamp}-{rand_suffix}")
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
