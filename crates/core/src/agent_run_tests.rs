// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn queue_then_start_transitions_status() {
    let mut run = AgentRun::default();
    run.queue("codex", 100);
    assert_eq!(run.status, Some(AgentRunStatus::Queued));
    run.start(200);
    assert_eq!(run.status, Some(AgentRunStatus::Running));
    assert_eq!(run.started_at_ms, Some(200));
}

#[test]
fn reset_on_load_returns_notice_for_in_flight_run() {
    let mut run = AgentRun::default();
    run.queue("claude", 100);
    run.start(200);

    let notice = reset_on_load("dm:1", &mut run);
    let notice = notice.expect("expected a post-restart notice");
    assert_eq!(notice.conversation_key, "dm:1");
    assert_eq!(notice.status, AgentRunStatus::Running);
    assert_eq!(notice.provider.as_deref(), Some("claude"));
    assert!(run.status.is_none());
}

#[test]
fn reset_on_load_is_none_for_idle_run() {
    let mut run = AgentRun::default();
    assert!(reset_on_load("dm:1", &mut run).is_none());
}

#[test]
fn clear_resets_to_default() {
    let mut run = AgentRun::default();
    run.queue("codex", 100);
    run.interrupt("ask", 150);
    run.clear();
    assert!(run.status.is_none());
    assert!(run.last_interrupted_reason.is_none());
}
