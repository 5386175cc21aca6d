// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the inlined bash wrapper script a detached job runs under: it
//! writes its own PID, redirects both streams to the job log, traps
//! SIGTERM/SIGINT to record a signal-derived exit code, then execs the
//! user's command.

use std::path::Path;

/// 128+signal, the POSIX convention for a signal-terminated exit code.
fn signal_exit_code(signal_number: u8) -> u8 {
    128u8.saturating_add(signal_number)
}

/// Builds the wrapper script text. The caller spawns `bash -c <script>`
/// with `process_group(0)` set so `kill(-pid)` is always valid even if the
/// user's command never calls `setpgid` itself.
pub fn build_wrapper_script(command: &str, workdir: &Path, pid_path: &Path, log_path: &Path, exit_code_path: &Path) -> String {
    let term_code = signal_exit_code(15);
    let int_code = signal_exit_code(2);
    format!(
        r#"#!/bin/bash
PID_PATH={pid_path}
WORKDIR={workdir}
LOG_PATH={log_path}
EXIT_CODE_PATH={exit_code_path}
echo $$ > "$PID_PATH"
cd "$WORKDIR" || exit 1
exec >"$LOG_PATH" 2>&1
trap 'echo {term_code} > "$EXIT_CODE_PATH"; exit {term_code}' TERM
trap 'echo {int_code} > "$EXIT_CODE_PATH"; exit {int_code}' INT
bash -lc {command}
code=$?
echo $code > "$EXIT_CODE_PATH"
exit $code
"#,
        pid_path = shell_quote(&pid_path.display().to_string()),
        workdir = shell_quote(&workdir.display().to_string()),
        log_path = shell_quote(&log_path.display().to_string()),
        exit_code_path = shell_quote(&exit_code_path.display().to_string()),
        command = shell_quote(command),
    )
}

/// Single-quotes a string for safe inclusion in a generated shell script,
/// escaping embedded single quotes the standard `'\''` way.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
#[path = "job_wrapper_tests.rs"]
mod tests;
