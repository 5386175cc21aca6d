// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_core::session::Session;

fn session(dir: &std::path::Path) -> Session {
    Session::new("dm:1", dir.to_path_buf())
}

fn layout(dir: &std::path::Path) -> Layout {
    Layout::new(dir.to_path_buf())
}

#[test]
fn parse_rejects_text_without_leading_slash() {
    assert!(parse("hello").is_err());
}

#[test]
fn parse_help_and_status() {
    assert_eq!(parse("/help").unwrap(), Command::Help);
    assert_eq!(parse("/status").unwrap(), Command::Status);
}

#[test]
fn parse_ask_and_inject_require_text() {
    assert!(parse("/ask").is_err());
    assert_eq!(parse("/ask is this safe?").unwrap(), Command::Ask("is this safe?".to_string()));
    assert!(parse("/inject").is_err());
    assert_eq!(parse("/inject stop and commit now").unwrap(), Command::Inject("stop and commit now".to_string()));
}

#[test]
fn parse_task_subcommands() {
    assert_eq!(parse("/task add fix the bug").unwrap(), Command::Task(TaskCommand::Add("fix the bug".to_string())));
    assert_eq!(parse("/task list").unwrap(), Command::Task(TaskCommand::List));
    assert_eq!(parse("/task clear").unwrap(), Command::Task(TaskCommand::Clear(ClearScope::Done)));
    assert_eq!(parse("/task clear all").unwrap(), Command::Task(TaskCommand::Clear(ClearScope::All)));
    assert!(parse("/task bogus").is_err());
}

#[test]
fn parse_worktree_new_with_flags() {
    let cmd = parse("/worktree new feature-x --from main --use").unwrap();
    assert_eq!(cmd, Command::Worktree(WorktreeCommand::New { name: "feature-x".to_string(), from: Some("main".to_string()), use_it: true }));
}

#[test]
fn parse_plan_bare_request_is_shorthand_for_new() {
    assert_eq!(parse("/plan add retries to the http client").unwrap(), Command::Plan(PlanCommand::Request("add retries to the http client".to_string())));
    assert_eq!(parse("/plan show last").unwrap(), Command::Plan(PlanCommand::Show(PlanRef::Last)));
    assert_eq!(parse("/plan queue p-1 --run").unwrap(), Command::Plan(PlanCommand::Queue { plan: PlanRef::Id("p-1".to_string()), run: true }));
}

#[test]
fn parse_handoff_flags() {
    let cmd = parse("/handoff --no-commit --push").unwrap();
    assert_eq!(cmd, Command::Handoff(HandoffArgs { dry_run: false, commit: Some(false), push: Some(true) }));
}

#[test]
fn parse_auto_toggle() {
    assert_eq!(parse("/auto actions on").unwrap(), Command::Auto(AutoCommand { target: AutoTarget::Actions, on: true }));
    assert!(parse("/auto actions maybe").is_err());
}

#[test]
fn parse_exp_run_collects_kv_pairs() {
    let cmd = parse("/exp run t-0001 seed=1 lr=0.01").unwrap();
    assert_eq!(cmd, Command::Exp(ExpCommand::Run { task_id: "t-0001".to_string(), kv: vec![("seed".to_string(), "1".to_string()), ("lr".to_string(), "0.01".to_string())] }));
}

#[tokio::test]
async fn handle_ask_and_inject_return_no_reply_and_an_intent() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Ask("are we done?".to_string()), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.is_empty());
    assert_eq!(intent, Some(Intent::Ask { question: "are we done?".to_string() }));

    let (reply, intent) = handle(Command::Inject("stop now".to_string()), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.is_empty());
    assert_eq!(intent, Some(Intent::Inject { prompt: "stop now".to_string() }));
}

#[tokio::test]
async fn handle_task_add_then_list_then_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Task(TaskCommand::Add("write the report".to_string())), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.starts_with("Queued task"));
    assert!(intent.is_none());
    assert_eq!(s.tasks.len(), 1);

    let (reply, _) = handle(Command::Task(TaskCommand::List), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.contains("write the report"));

    let (reply, intent) = handle(Command::Task(TaskCommand::Run), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.contains("Starting"));
    assert_eq!(intent, Some(Intent::StartTaskLoop));
}

#[tokio::test]
async fn handle_task_run_refuses_when_already_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    s.task_loop.running = true;
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Task(TaskCommand::Run), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.contains("already running"));
    assert!(intent.is_none());
}

#[tokio::test]
async fn handle_reset_clears_session_id_and_bootstrap_version() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    s.external_session_id = Some("sess-1".to_string());
    s.bootstrap_version = 3;
    let layout = layout(dir.path());

    handle(Command::Reset, &mut s, &layout, 1_000).await.unwrap();

    assert!(s.external_session_id.is_none());
    assert_eq!(s.bootstrap_version, 0);
}

#[tokio::test]
async fn handle_auto_toggle_flips_the_right_field() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    handle(Command::Auto(AutoCommand { target: AutoTarget::Research, on: true }), &mut s, &layout, 1_000).await.unwrap();

    assert!(s.auto.research);
    assert!(!s.auto.actions);
}

#[tokio::test]
async fn handle_job_logs_reads_the_job_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let job_dir = dir.path().join("job-1");
    tokio::fs::create_dir_all(&job_dir).await.unwrap();
    let paths = relay_core::job::JobPaths::under(job_dir);
    tokio::fs::write(&paths.log_path, b"hello from the job\n").await.unwrap();
    let job = relay_core::job::Job::new("j-1", "echo hi", dir.path().to_path_buf(), paths.job_dir.clone(), relay_core::job::WatchConfig::minimal(10, 20), 1_000);
    s.jobs.push(job);

    let (reply, _) = handle(Command::Job(JobCommand::Logs(Some("j-1".to_string()))), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.contains("hello from the job"));
}

#[tokio::test]
async fn handle_plan_show_reads_markdown_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let plan_path = dir.path().join("plan.md");
    tokio::fs::write(&plan_path, "# The Plan\n").await.unwrap();
    relay_core::plan::push_plan(
        &mut s.plans,
        relay_core::plan::Plan { id: "p-1".to_string(), created_at_ms: 1_000, title: "the plan".to_string(), workdir: dir.path().to_path_buf(), markdown_path: plan_path, request_text: "do the thing".to_string() },
    );

    let (reply, _) = handle(Command::Plan(PlanCommand::Show(PlanRef::Last)), &mut s, &layout, 2_000).await.unwrap();
    assert!(reply.contains("# The Plan"));
}

#[tokio::test]
async fn handle_plan_apply_without_confirm_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Plan(PlanCommand::Apply { plan: PlanRef::Last, confirm: false }), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.contains("--confirm"));
    assert!(intent.is_none());
}

#[tokio::test]
async fn handle_research_start_scaffolds_and_binds_the_project() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Research(ResearchCommand::Start("find the fastest sort".to_string())), &mut s, &layout, 5_000).await.unwrap();

    assert!(reply.contains("Research project started"));
    assert!(intent.is_none());
    let binding = s.research.as_ref().expect("research binding set");
    assert!(binding.project_root.join("idea/goal.md").exists());
}

#[tokio::test]
async fn handle_research_status_without_a_project_says_so() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, _) = handle(Command::Research(ResearchCommand::Status), &mut s, &layout, 1_000).await.unwrap();
    assert!(reply.contains("No research project"));
}

#[tokio::test]
async fn handle_research_pause_then_status_reflects_paused() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    handle(Command::Research(ResearchCommand::Start("goal".to_string())), &mut s, &layout, 1_000).await.unwrap();
    handle(Command::Research(ResearchCommand::Pause), &mut s, &layout, 2_000).await.unwrap();
    let (reply, _) = handle(Command::Research(ResearchCommand::Status), &mut s, &layout, 3_000).await.unwrap();

    assert!(reply.contains("Paused"));
}

#[tokio::test]
async fn handle_overnight_start_queues_a_task_and_enables_auto_actions() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Overnight(OvernightCommand::Start("ship the feature".to_string())), &mut s, &layout, 1_000).await.unwrap();

    assert!(reply.contains("Overnight run queued"));
    assert_eq!(intent, Some(Intent::StartTaskLoop));
    assert!(s.auto.actions);
    assert_eq!(s.tasks.len(), 1);
}

#[tokio::test]
async fn handle_go_is_shorthand_for_task_add_and_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(dir.path());
    let layout = layout(dir.path());

    let (reply, intent) = handle(Command::Go("refactor the parser".to_string()), &mut s, &layout, 1_000).await.unwrap();

    assert!(reply.contains("Queued"));
    assert_eq!(intent, Some(Intent::StartTaskLoop));
    assert_eq!(s.tasks.len(), 1);
    assert!(!s.task_loop.stop_requested);
}
