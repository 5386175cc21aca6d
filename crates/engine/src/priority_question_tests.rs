// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_adapters::fake_transport::FakeChatTransport;
use relay_adapters::{AgentRunOutcome, FakeAgentCliAdapter};

fn request(conversation_key: &str, workdir: &std::path::Path) -> AskRequest {
    AskRequest {
        conversation_key: conversation_key.to_string(),
        channel_id: "chan".to_string(),
        question: "what port is this listening on?".to_string(),
        provider: Provider::Codex,
        workdir: workdir.to_path_buf(),
        active_root_pid: None,
        job_summaries: vec!["j-0001: running (pid 123)".to_string()],
        log_path: None,
    }
}

fn runner(adapter: Arc<FakeAgentCliAdapter>, transport: Arc<FakeChatTransport>) -> PriorityQuestionRunner {
    PriorityQuestionRunner {
        adapter,
        transport,
        interrupt_buffer: Arc::new(InterruptSnapshotBuffer::new()),
        state: Arc::new(PriorityQuestionState::new()),
        snapshot_recent_lines: 20,
    }
}

#[tokio::test]
async fn answers_and_edits_the_handling_reply() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { final_text: "port 8080".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport.clone());

    runner.ask(request("conv-1", dir.path())).await.unwrap();

    let sent = transport.sent_messages();
    assert_eq!(sent[0].text, "Handling priority question...");
    assert_eq!(sent.last().unwrap().text, "port 8080");
    assert_eq!(sent.last().unwrap().message_id, sent[0].message_id, "final answer must edit the handling reply, not post a new one");
}

#[tokio::test]
async fn ephemeral_config_is_used_for_codex_with_read_only_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { final_text: "ok".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport);

    runner.ask(request("conv-1", dir.path())).await.unwrap();

    let call = adapter.calls().into_iter().next().unwrap();
    assert!(call.ephemeral);
    assert_eq!(call.sandbox_mode.as_deref(), Some("read-only"));
    assert!(call.resume_session_id.is_none());
}

#[tokio::test]
async fn claude_invocation_has_no_resume_session_id() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { final_text: "ok".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter.clone(), transport);

    let mut req = request("conv-1", dir.path());
    req.provider = Provider::Claude;
    runner.ask(req).await.unwrap();

    let call = adapter.calls().into_iter().next().unwrap();
    assert!(call.ephemeral);
    assert!(call.sandbox_mode.is_none());
    assert!(call.resume_session_id.is_none());
}

#[tokio::test]
async fn second_question_for_the_same_conversation_is_refused_while_the_first_is_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    let transport = Arc::new(FakeChatTransport::new());
    let state = Arc::new(PriorityQuestionState::new());
    assert!(state.try_begin("conv-1"));

    let runner = PriorityQuestionRunner {
        adapter,
        transport,
        interrupt_buffer: Arc::new(InterruptSnapshotBuffer::new()),
        state: state.clone(),
        snapshot_recent_lines: 20,
    };

    let err = runner.ask(request("conv-1", dir.path())).await.unwrap_err();
    assert!(matches!(err, EngineError::PriorityQuestionBusy(_)));
}

#[tokio::test]
async fn adapter_failure_edits_the_handling_reply_with_a_failure_message_and_still_frees_the_slot() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_err(relay_adapters::AgentError::Transient("boom".to_string()));
    let transport = Arc::new(FakeChatTransport::new());
    let state = Arc::new(PriorityQuestionState::new());
    let runner = PriorityQuestionRunner { adapter, transport: transport.clone(), interrupt_buffer: Arc::new(InterruptSnapshotBuffer::new()), state: state.clone(), snapshot_recent_lines: 20 };

    let err = runner.ask(request("conv-1", dir.path())).await.unwrap_err();
    assert!(matches!(err, EngineError::Agent(_)));
    assert!(transport.last_text_for("chan").unwrap().contains("Priority question failed"));
    assert!(state.try_begin("conv-1"), "slot must be freed even after a failed attempt");
}

#[tokio::test]
async fn pauses_and_resumes_the_active_process_tree_around_the_question() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = tokio::process::Command::new("sleep").arg("5").spawn().unwrap();
    let pid = child.id().unwrap() as i32;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let adapter = Arc::new(FakeAgentCliAdapter::new());
    adapter.push_ok(AgentRunOutcome { final_text: "ok".to_string(), ..Default::default() });
    let transport = Arc::new(FakeChatTransport::new());
    let runner = runner(adapter, transport);

    let mut req = request("conv-1", dir.path());
    req.active_root_pid = Some(pid);
    runner.ask(req).await.unwrap();

    let stat = tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await.unwrap();
    assert!(!stat.contains(") T "), "process must be resumed once the question is answered, got: {stat}");

    let _ = child.kill().await;
    let _ = child.wait().await;
}

#[test]
fn pick_log_path_prefers_explicit_over_inferred_over_progress_mentioned() {
    let explicit = PathBuf::from("/a/explicit.log");
    let inferred = PathBuf::from("/a/inferred.log");
    let mentioned = PathBuf::from("/a/mentioned.log");

    assert_eq!(pick_log_path(Some(&explicit), Some(&inferred), Some(&mentioned)), Some(explicit.as_path()));
    assert_eq!(pick_log_path(None, Some(&inferred), Some(&mentioned)), Some(inferred.as_path()));
    assert_eq!(pick_log_path(None, None, Some(&mentioned)), Some(mentioned.as_path()));
    assert_eq!(pick_log_path(None, None, None), None);
}

#[test]
fn infer_log_path_from_progress_finds_the_most_recent_dot_log_mention() {
    let lines = vec!["starting up".to_string(), "writing to /tmp/run-1.log".to_string(), "still going".to_string(), "tailing /tmp/run-2.log now".to_string()];
    assert_eq!(infer_log_path_from_progress(&lines), Some(PathBuf::from("/tmp/run-2.log")));
}

#[test]
fn infer_log_path_from_progress_returns_none_when_nothing_mentions_a_log_file() {
    let lines = vec!["starting up".to_string(), "still going".to_string()];
    assert_eq!(infer_log_path_from_progress(&lines), None);
}

#[test]
fn render_snapshot_prompt_includes_question_progress_jobs_and_log_excerpt() {
    let snapshot = RunSnapshot {
        recent_progress: vec!["did a thing".to_string()],
        job_summaries: vec!["j-0001: running".to_string()],
        log_excerpt: Some("tail of the log".to_string()),
    };
    let prompt = render_snapshot_prompt("is it done?", &snapshot);
    assert!(prompt.contains("is it done?"));
    assert!(prompt.contains("did a thing"));
    assert!(prompt.contains("j-0001: running"));
    assert!(prompt.contains("tail of the log"));
}
