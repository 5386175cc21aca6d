// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn new_job() -> Job {
    Job::new(
        "j-20260101-000000-ab12",
        "echo hi",
        "/work".into(),
        "/state/jobs/j-1".into(),
        WatchConfig::minimal(1, 5),
        1_000,
    )
}

#[test]
fn new_job_starts_running_with_queued_and_running_lifecycle() {
    let job = new_job();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.lifecycle.len(), 2);
    assert_eq!(job.lifecycle[0].state, "queued");
    assert_eq!(job.lifecycle[1].state, "running");
}

#[test]
fn finalize_zero_exit_code_is_done() {
    let mut job = new_job();
    job.finalize_from_exit_code(0, 2_000);
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(job.finished_at_ms, Some(2_000));
}

#[test]
fn finalize_nonzero_exit_code_is_failed() {
    let mut job = new_job();
    job.finalize_from_exit_code(1, 2_000);
    assert_eq!(job.status, JobStatus::Failed);
}

#[test]
fn finalize_does_not_overwrite_canceled() {
    let mut job = new_job();
    job.mark_canceled(1_500);
    job.finalize_from_exit_code(0, 2_000);
    assert_eq!(job.status, JobStatus::Canceled);
    // exit code is not recorded once status was forced terminal.
    assert_eq!(job.exit_code, None);
}

#[test]
fn finalize_does_not_overwrite_blocked() {
    let mut job = new_job();
    job.mark_blocked("artifact missing", 1_500);
    job.finalize_from_exit_code(0, 2_000);
    assert_eq!(job.status, JobStatus::Blocked);
}

#[test]
fn is_unknown_when_running_with_no_leader_and_no_exit_file() {
    let job = new_job();
    assert!(job.is_unknown(false, false));
    assert!(!job.is_unknown(true, false));
    assert!(!job.is_unknown(false, true));
}

#[test]
fn lifecycle_log_is_bounded() {
    let mut job = new_job();
    for i in 0..(MAX_LIFECYCLE_ENTRIES + 10) {
        job.push_lifecycle(format!("tick-{i}"), i as u64, None);
    }
    assert_eq!(job.lifecycle.len(), MAX_LIFECYCLE_ENTRIES);
}

#[test]
fn job_paths_are_derived_from_job_dir() {
    let paths = JobPaths::under("/state/jobs/j-1".into());
    assert_eq!(paths.log_path, std::path::PathBuf::from("/state/jobs/j-1/job.log"));
    assert_eq!(paths.exit_code_path, std::path::PathBuf::from("/state/jobs/j-1/exit_code"));
    assert_eq!(paths.pid_path, std::path::PathBuf::from("/state/jobs/j-1/pid"));
}

#[test]
fn watch_config_artifact_gate() {
    let mut watch = WatchConfig::minimal(1, 5);
    assert!(!watch.has_artifact_gate());
    watch.require_files.push("/tmp/ready".into());
    assert!(watch.has_artifact_gate());
}
