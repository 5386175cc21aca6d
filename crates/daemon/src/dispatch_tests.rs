// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_adapters::{AgentCliAdapter, AgentRunOutcome, ChatTransport, FakeAgentCliAdapter, FakeChatTransport, Provider};
use relay_core::clock::{Clock, SystemClock};
use relay_core::config::Config;
use relay_engine::interrupt_buffer::InterruptSnapshotBuffer;
use relay_engine::pcq::Pcq;
use relay_engine::priority_question::{PriorityQuestionRunner, PriorityQuestionState};
use relay_engine::progress::ProgressConfig;
use relay_engine::retry::AgentAwareConfig;
use relay_engine::runner::{ActivePids, AgentRunner};
use relay_storage::paths::Layout;
use relay_storage::state::State;
use std::sync::Arc;
use std::time::Duration;

fn test_daemon(dir: &std::path::Path, adapter: Arc<FakeAgentCliAdapter>) -> Daemon {
    let mut config = Config::default();
    config.state_dir = dir.to_path_buf();
    let layout = Layout::new(config.state_dir.clone());
    let transport: Arc<dyn ChatTransport> = Arc::new(FakeChatTransport::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pcq = Arc::new(Pcq::new());
    let interrupt_buffer = Arc::new(InterruptSnapshotBuffer::new());
    let dyn_adapter: Arc<dyn AgentCliAdapter> = adapter;
    let active_pids = ActivePids::new();

    let runner = AgentRunner {
        adapter: dyn_adapter.clone(),
        transport: transport.clone(),
        pcq: pcq.clone(),
        interrupt_buffer: interrupt_buffer.clone(),
        clock: clock.clone(),
        retry_config: AgentAwareConfig::from(&config),
        active_pids: active_pids.clone(),
        progress_config: ProgressConfig {
            min_edit: Duration::from_millis(config.min_edit_ms),
            heartbeat: Duration::from_millis(config.heartbeat_ms),
            edit_timeout: Duration::from_millis(config.edit_timeout_ms),
            stall_warn: Duration::from_millis(config.stall_warn_ms),
            max_lines: config.progress_max_lines,
            agent_label: "agent".to_string(),
            timeout_label: config.agent_timeout,
        },
    };

    let priority_question = PriorityQuestionRunner {
        adapter: dyn_adapter,
        transport: transport.clone(),
        interrupt_buffer,
        state: Arc::new(PriorityQuestionState::new()),
        snapshot_recent_lines: 20,
    };

    Daemon {
        config,
        layout,
        state: parking_lot::Mutex::new(State::default()),
        transport,
        clock,
        pcq,
        runner,
        priority_question,
        default_provider: Provider::Codex,
        active_pids,
        watcher_states: parking_lot::Mutex::new(std::collections::HashMap::new()),
        research_tick_at: parking_lot::Mutex::new(std::collections::HashMap::new()),
    }
}

#[tokio::test]
async fn dispatch_plain_text_runs_the_agent_and_stores_the_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { session_id: Some("sess-1".to_string()), final_text: "done".to_string(), model: None, divergence_detected: false });
    let daemon = test_daemon(dir.path(), adapter);

    dispatch::dispatch_message(&daemon, "dm:1", "console", "fix the bug").await;

    let state = daemon.state.lock();
    let session = state.sessions.get("dm:1").expect("session created");
    assert_eq!(session.external_session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn dispatch_help_command_does_not_run_the_agent() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    let daemon = test_daemon(dir.path(), adapter.clone());

    dispatch::dispatch_message(&daemon, "dm:1", "console", "/help").await;

    assert!(adapter.calls().is_empty());
}

#[tokio::test]
async fn dispatch_task_add_then_task_run_starts_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { session_id: None, final_text: "summarized. [[task:done]]".to_string(), model: None, divergence_detected: false });
    let daemon = test_daemon(dir.path(), adapter.clone());

    dispatch::dispatch_message(&daemon, "dm:1", "console", "/task add write the report").await;
    dispatch::dispatch_message(&daemon, "dm:1", "console", "/task run").await;

    assert_eq!(adapter.calls().len(), 1);
    let state = daemon.state.lock();
    let session = state.sessions.get("dm:1").unwrap();
    assert!(!session.task_loop.running);
}

#[tokio::test]
async fn dispatch_ask_answers_without_a_tracked_pid() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { session_id: None, final_text: "not yet".to_string(), model: None, divergence_detected: false });
    let daemon = test_daemon(dir.path(), adapter.clone());

    dispatch::dispatch_message(&daemon, "dm:1", "console", "/ask are we done?").await;

    assert_eq!(adapter.calls().len(), 1);
}

#[tokio::test]
async fn dispatch_inject_terminates_a_tracked_pid_before_rerunning() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { session_id: None, final_text: "restarted".to_string(), model: None, divergence_detected: false });
    let daemon = test_daemon(dir.path(), adapter.clone());

    // A pid that is certainly not a real child of this test process: the
    // signal delivery is expected to fail silently rather than panic, and
    // `/inject` still clears the lane and reruns.
    daemon.active_pids.set_for_test("dm:1", 999_999);

    dispatch::dispatch_message(&daemon, "dm:1", "console", "/inject new direction").await;

    assert_eq!(adapter.calls().len(), 1);
}
