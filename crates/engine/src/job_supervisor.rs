// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component H: `startJob`/`stopJob`. Allocates a job dir, writes the
//! wrapper script, spawns it detached, and persists the [`Job`] record.
//! The watcher (component I) owns everything that happens after launch.

use crate::EngineError;
use relay_adapters::job_wrapper::build_wrapper_script;
use relay_adapters::{process, signals};
use relay_core::job::{Job, WatchConfig};
use relay_storage::paths::Layout;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StartJobRequest {
    pub conversation_key: String,
    pub sanitized_conv_key: String,
    pub job_id: String,
    pub command: String,
    pub description: Option<String>,
    pub workdir: PathBuf,
    pub watch: WatchConfig,
}

/// Allocates the job dir, writes the wrapper script to disk, spawns it
/// detached, and returns the `Job` record with `pid` populated once the
/// wrapper has had a chance to write its own pidfile. The caller is
/// responsible for inserting the returned `Job` into the session and
/// starting a watcher against it.
pub async fn start_job(layout: &Layout, request: StartJobRequest, now_ms: u64) -> Result<Job, EngineError> {
    let job_dir = layout.job_dir(&request.sanitized_conv_key, &request.job_id);
    tokio::fs::create_dir_all(&job_dir).await?;

    let mut job = Job::new(request.job_id.clone(), request.command.clone(), request.workdir.clone(), job_dir.clone(), request.watch, now_ms);
    if let Some(description) = request.description {
        job.description = Some(description);
    }

    let script = build_wrapper_script(&request.command, &request.workdir, &job.paths.pid_path, &job.paths.log_path, &job.paths.exit_code_path);
    let env = process::build_child_env(None);
    let mut child = process::spawn_child("bash", &["-c".to_string(), script], &env, Some(&request.workdir))
        .map_err(|err| EngineError::Io(std::io::Error::other(err.to_string())))?;

    // The wrapper is detached: we don't wait on it, only record its
    // leader pid so `stop_job` can signal the group later. The leader
    // immediately re-execs into the wrapper script which overwrites its
    // own PID into `pid_path`, but the spawned bash process's own pid is
    // already the process-group leader, so either value is a valid
    // signaling target.
    let child_pid = child.id();
    job.pid = child_pid.map(|pid| pid as u32);
    // `kill_on_drop` on the underlying `Command` would reap the child the
    // moment `child` drops; `try_wait` followed by forgetting the handle
    // leaves it running, unref'd, the way a detached job must.
    let _ = child.try_wait();
    std::mem::forget(child);

    Ok(job)
}

/// Stops a running job: SIGTERM to the process group the wrapper leads.
/// The wrapper's own trap writes `exit_code`; the watcher observes it on
/// its next tick and finalizes the job.
pub fn stop_job(job: &Job) -> Result<(), EngineError> {
    let Some(pid) = job.pid else {
        return Err(EngineError::NoRunningJob(job.id.clone()));
    };
    signals::terminate_process_group(pid as i32);
    Ok(())
}

#[cfg(test)]
#[path = "job_supervisor_tests.rs"]
mod tests;
