// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess spawn helpers shared by the agent CLI adapters and the job
//! supervisor: timeout enforcement, environment stripping, and the
//! SIGTERM-then-SIGKILL escalation every "stop a child" path in the spec
//! uses.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Grace period between SIGTERM and SIGKILL for a child that won't exit.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Timeout for one progress-reporter edit operation, so a stuck transport
/// cannot wedge a run.
pub const EDIT_TIMEOUT: Duration = Duration::from_secs(8);

/// Timeout for artifact-readiness polling ticks.
pub const ARTIFACT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns a copy of the current process environment with every
/// `CLAUDECODE*` variable stripped, preventing a nested CLI session from
/// inheriting the wrong credentials, plus an optional upload-root
/// injection.
pub fn build_child_env(upload_root: Option<&std::path::Path>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().filter(|(k, _)| !k.starts_with("CLAUDECODE")).collect();
    if let Some(root) = upload_root {
        env.insert("RELAY_UPLOAD_ROOT".to_string(), root.display().to_string());
    }
    env
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn child process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("child timed out after {0:?}")]
    Timeout(Duration),
}

/// Spawns `program argv` with `env`, in `workdir` (if given), with stdin
/// closed and stdout/stderr piped.
pub fn spawn_child(
    program: &str,
    argv: &[String],
    env: &HashMap<String, String>,
    workdir: Option<&std::path::Path>,
) -> Result<Child, SpawnError> {
    let mut command = Command::new(program);
    command.args(argv);
    command.env_clear();
    command.envs(env);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    if let Some(dir) = workdir {
        command.current_dir(dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Make the child its own process-group leader so a later
        // `kill(-pid)` is always valid, regardless of whether the child
        // itself calls `setpgid`.
        command.process_group(0);
    }
    command.kill_on_drop(true);
    Ok(command.spawn()?)
}

/// Waits for `child` to exit, enforcing `timeout_duration` (0 disables).
/// On expiry, sends SIGTERM to the process group; if still alive after
/// [`KILL_GRACE`], sends SIGKILL.
pub async fn wait_with_timeout(mut child: Child, timeout_duration: Duration) -> Result<std::process::ExitStatus, SpawnError> {
    if timeout_duration.is_zero() {
        return Ok(child.wait().await?);
    }

    match timeout(timeout_duration, child.wait()).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            if let Some(pid) = child.id() {
                crate::signals::terminate_process_group(pid as i32);
            }
            match timeout(KILL_GRACE, child.wait()).await {
                Ok(result) => Ok(result?),
                Err(_) => {
                    if let Some(pid) = child.id() {
                        crate::signals::kill_process_group(pid as i32);
                    }
                    Ok(child.wait().await?)
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
