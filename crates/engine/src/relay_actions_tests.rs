// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_core::config::GuardMode;
use relay_core::job::WatchConfig;
use relay_core::session::Session;
use std::path::PathBuf;

fn markers(json: &str) -> Vec<Marker> {
    vec![Marker::RelayActions { json: json.to_string() }]
}

fn config() -> RelayActionsConfig {
    RelayActionsConfig { enabled: true, dm_only: false, max_per_message: DEFAULT_MAX_PER_MESSAGE, wait_pattern_guard_mode: GuardMode::Reject, workdir_allow_roots: vec![PathBuf::from("/")] }
}

fn session(dir: &std::path::Path) -> Session {
    let mut s = Session::new("dm:1", dir.to_path_buf());
    s.auto.actions = true;
    s
}

fn layout(dir: &std::path::Path) -> Layout {
    Layout::new(dir.to_path_buf())
}

#[test]
fn parses_task_add_and_task_run() {
    let json = r#"{"actions":[{"type":"task_add","description":"do a thing","prompt":"please do the thing"},{"type":"TASK_RUN"}]}"#;
    let parsed = parse(&markers(json));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert_eq!(parsed.actions.len(), 2);
    assert!(matches!(&parsed.actions[0], ValidatedAction::TaskAdd { description, .. } if description == "do a thing"));
    assert!(matches!(parsed.actions[1], ValidatedAction::TaskRun));
}

#[test]
fn rejects_unknown_field_in_task_add() {
    let json = r#"{"actions":[{"type":"task_add","description":"x","prompt":"y","extra":true}]}"#;
    let parsed = parse(&markers(json));
    assert!(parsed.actions.is_empty());
    assert_eq!(parsed.errors.len(), 1);
}

#[test]
fn rejects_job_start_with_both_command_and_supervisor() {
    let json = r#"{"actions":[{"type":"job_start","command":"echo hi","supervisor":{"script":"s.py","stateFile":"state.json","expectStatus":"ready"}}]}"#;
    let parsed = parse(&markers(json));
    assert!(parsed.actions.is_empty());
    assert!(parsed.errors[0].contains("exactly one of"));
}

#[test]
fn rejects_job_start_with_neither_command_nor_supervisor() {
    let json = r#"{"actions":[{"type":"job_start"}]}"#;
    let parsed = parse(&markers(json));
    assert!(parsed.actions.is_empty());
    assert!(parsed.errors[0].contains("is required"));
}

#[test]
fn unsafe_wait_pattern_detects_self_matching_pgrep() {
    let command = "nohup my-server --flag & pgrep -f 'my-server'";
    assert_eq!(unsafe_wait_pattern(command).as_deref(), Some("my-server"));
}

#[test]
fn unsafe_wait_pattern_ignores_commands_without_pgrep() {
    assert_eq!(unsafe_wait_pattern("echo hello"), None);
}

#[tokio::test]
async fn dispatch_adds_task_and_reports_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let parsed = parse(&markers(r#"{"actions":[{"type":"task_add","description":"d","prompt":"p"}]}"#));

    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &config(), true, 1_000).await.unwrap();

    assert_eq!(report.tasks_added.len(), 1);
    assert_eq!(s.tasks.len(), 1);
    assert_eq!(s.tasks[0].description, "d");
}

#[tokio::test]
async fn dispatch_refuses_everything_when_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let parsed = parse(&markers(r#"{"actions":[{"type":"task_run"}]}"#));
    let mut cfg = config();
    cfg.enabled = false;

    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &cfg, true, 1_000).await.unwrap();

    assert!(!report.start_task_runner);
    assert_eq!(report.rejected.len(), 1);
}

#[tokio::test]
async fn dispatch_refuses_when_conversation_auto_actions_is_off() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    s.auto.actions = false;
    let parsed = parse(&markers(r#"{"actions":[{"type":"task_run"}]}"#));

    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &config(), true, 1_000).await.unwrap();

    assert!(report.rejected.iter().any(|r| r.contains("off for this conversation")));
}

#[tokio::test]
async fn dispatch_drops_actions_beyond_the_per_message_budget() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let mut cfg = config();
    cfg.max_per_message = 1;
    let json = r#"{"actions":[{"type":"task_add","description":"a","prompt":"a"},{"type":"task_add","description":"b","prompt":"b"}]}"#;
    let parsed = parse(&markers(json));

    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &cfg, true, 1_000).await.unwrap();

    assert_eq!(report.tasks_added.len(), 1);
    assert!(report.rejected.iter().any(|r| r.contains("dropped 1")));
}

#[tokio::test]
async fn dispatch_sets_start_task_runner_flag_when_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let parsed = parse(&markers(r#"{"actions":[{"type":"task_run"}]}"#));

    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &config(), true, 1_000).await.unwrap();

    assert!(report.start_task_runner);
}

#[tokio::test]
async fn dispatch_job_watch_merges_patch_onto_existing_job() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let job_dir = dir.path().join("job");
    std::fs::create_dir_all(&job_dir).unwrap();
    let job = relay_core::job::Job::new("j-0001", "echo hi", dir.path().to_path_buf(), job_dir, WatchConfig::minimal(10, 20), 0);
    s.jobs.push(job);

    let parsed = parse(&markers(r#"{"actions":[{"type":"job_watch","jobId":"j-0001","watch":{"everySec":5}}]}"#));
    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &config(), true, 1_000).await.unwrap();

    assert_eq!(report.jobs_watched, vec!["j-0001".to_string()]);
    assert_eq!(s.jobs[0].watch.every_sec, 5);
}

#[tokio::test]
async fn dispatch_job_stop_rejects_when_no_job_matches() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let parsed = parse(&markers(r#"{"actions":[{"type":"job_stop","jobId":"missing"}]}"#));

    let report = dispatch(&mut s, &layout(dir.path()), parsed.actions, &config(), true, 1_000).await.unwrap();

    assert!(report.jobs_stopped.is_empty());
    assert_eq!(report.rejected.len(), 1);
}
