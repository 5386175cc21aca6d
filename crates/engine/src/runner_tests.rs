// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_adapters::fake_transport::FakeChatTransport;
use relay_adapters::FakeAgentCliAdapter;
use relay_core::clock::FakeClock;

fn progress_config() -> ProgressConfig {
    ProgressConfig {
        min_edit: Duration::from_millis(50),
        heartbeat: Duration::from_millis(200),
        edit_timeout: Duration::from_millis(500),
        stall_warn: Duration::from_secs(3600),
        max_lines: 5,
        agent_label: "codex".to_string(),
        timeout_label: Duration::from_secs(600),
    }
}

fn retry_config() -> AgentAwareConfig {
    AgentAwareConfig { quota_fallback_model: "claude-3-5-haiku".to_string(), transient_retry_max: 2 }
}

fn runner(adapter: Arc<FakeAgentCliAdapter>, transport: Arc<FakeChatTransport>) -> AgentRunner {
    AgentRunner {
        adapter,
        transport,
        pcq: Arc::new(Pcq::new()),
        interrupt_buffer: Arc::new(InterruptSnapshotBuffer::new()),
        clock: Arc::new(FakeClock::new(1_000)),
        retry_config: retry_config(),
        progress_config: progress_config(),
        active_pids: ActivePids::new(),
    }
}

fn request() -> RunRequest {
    RunRequest {
        conversation_key: "dm:1".to_string(),
        channel_id: "chan-1".to_string(),
        provider: Provider::Codex,
        prompt: "do the thing".to_string(),
        resume_session_id: None,
        workdir: std::path::PathBuf::from("/work/repo"),
        model: None,
    }
}

#[tokio::test]
async fn successful_run_posts_initial_message_then_final_reply() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { session_id: Some("sess-1".to_string()), final_text: "all done".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter, transport.clone());

    let outcome = runner.run(request(), 0, &BootstrapConfig::default()).await.unwrap();

    assert_eq!(outcome.session_id, Some("sess-1".to_string()));
    assert!(outcome.bumped_bootstrap);
    assert!(!outcome.retried);
    let final_text = transport.last_text_for("chan-1").unwrap();
    assert!(final_text.contains("all done"));
}

#[tokio::test]
async fn bootstrap_block_is_injected_into_prompt_when_version_is_behind() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { final_text: "ok".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport);

    runner.run(request(), 0, &BootstrapConfig::default()).await.unwrap();

    let call = adapter.calls().into_iter().next().unwrap();
    assert!(call.prompt.contains("relay-actions"));
    assert!(call.prompt.contains("do the thing"));
}

#[tokio::test]
async fn bootstrap_block_is_skipped_once_version_is_current() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { final_text: "ok".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport);

    let outcome = runner.run(request(), CURRENT_BOOTSTRAP_VERSION, &BootstrapConfig::default()).await.unwrap();

    assert!(!outcome.bumped_bootstrap);
    let call = adapter.calls().into_iter().next().unwrap();
    assert_eq!(call.prompt, "do the thing");
}

#[tokio::test]
async fn stale_session_error_triggers_one_rerun_with_cleared_session() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_err(AgentError::StaleSession("No conversation found with session ID".to_string()));
    adapter.push_ok(AgentRunOutcome { session_id: Some("sess-new".to_string()), final_text: "done".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport);

    let mut request = request();
    request.resume_session_id = Some("sess-old".to_string());
    let outcome = runner.run(request, CURRENT_BOOTSTRAP_VERSION, &BootstrapConfig::default()).await.unwrap();

    assert!(outcome.retried);
    assert_eq!(outcome.session_id, Some("sess-new".to_string()));
    let calls = adapter.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].resume_session_id, Some("sess-old".to_string()));
    assert_eq!(calls[1].resume_session_id, None);
}

#[tokio::test]
async fn quota_exhaustion_reruns_with_fallback_model() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_err(AgentError::QuotaExhausted("429".to_string()));
    adapter.push_ok(AgentRunOutcome { final_text: "done".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport);

    runner.run(request(), CURRENT_BOOTSTRAP_VERSION, &BootstrapConfig::default()).await.unwrap();

    let calls = adapter.calls();
    assert_eq!(calls[1].model, Some("claude-3-5-haiku".to_string()));
}

#[tokio::test]
async fn exhausted_retries_propagate_as_agent_error() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    for _ in 0..5 {
        adapter.push_err(AgentError::Transient("network: ECONNRESET".to_string()));
    }
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter, transport);

    let err = runner.run(request(), CURRENT_BOOTSTRAP_VERSION, &BootstrapConfig::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::Agent(AgentError::Transient(_))));
}

#[tokio::test]
async fn relay_action_block_is_stripped_from_the_visible_reply() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    let text = "Here is the result.\n[[relay-actions]]\n{\"actions\":[]}\n[[/relay-actions]]\nThanks.";
    adapter.push_ok(AgentRunOutcome { final_text: text.to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter, transport.clone());

    let outcome = runner.run(request(), CURRENT_BOOTSTRAP_VERSION, &BootstrapConfig::default()).await.unwrap();

    assert!(!outcome.reply_chunks[0].contains("relay-actions"));
    assert!(outcome.reply_chunks[0].contains("Here is the result"));
}

#[tokio::test]
async fn active_pid_is_cleared_once_the_run_completes() {
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok_with_pid(AgentRunOutcome { final_text: "done".to_string(), ..Default::default() }, 4321);
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter, transport);

    runner.run(request(), CURRENT_BOOTSTRAP_VERSION, &BootstrapConfig::default()).await.unwrap();

    assert_eq!(runner.active_pids.get(&request().conversation_key), None);
}

#[test]
fn chunk_for_chat_splits_on_line_boundaries_within_limit() {
    let text = "line one\nline two\nline three\n";
    let chunks = chunk_for_chat(text, 18);
    assert!(chunks.iter().all(|c| c.chars().count() <= 18));
    assert_eq!(chunks.join(""), text);
}

#[test]
fn chunk_for_chat_hard_splits_a_single_oversized_line() {
    let text = "x".repeat(50);
    let chunks = chunk_for_chat(&text, 10);
    assert_eq!(chunks.len(), 5);
    assert!(chunks.iter().all(|c| c.chars().count() == 10));
}

#[test]
fn chunk_for_chat_handles_empty_text() {
    assert_eq!(chunk_for_chat("", 10), vec![String::new()]);
}
