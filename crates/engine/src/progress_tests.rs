// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relay_adapters::fake_transport::FakeChatTransport;
use std::sync::Arc;

fn config() -> ProgressConfig {
    ProgressConfig {
        min_edit: Duration::from_millis(1_000),
        heartbeat: Duration::from_millis(30_000),
        edit_timeout: Duration::from_millis(5_000),
        stall_warn: Duration::from_millis(60_000),
        max_lines: 5,
        agent_label: "codex".to_string(),
        timeout_label: Duration::from_millis(600_000),
    }
}

fn reporter() -> ProgressReporter {
    ProgressReporter::new("dm:1", "chan-1", "msg-1", 0, config(), Arc::new(InterruptSnapshotBuffer::new()))
}

#[test]
fn note_pushes_into_ring_and_interrupt_buffer() {
    let buffer = Arc::new(InterruptSnapshotBuffer::new());
    let reporter = ProgressReporter::new("dm:1", "chan-1", "msg-1", 0, config(), buffer.clone());
    reporter.note("did a thing", 0, false, false);
    assert_eq!(buffer.recent("dm:1", 10), vec!["did a thing"]);
}

#[test]
fn ring_caps_at_three_times_max_lines() {
    let reporter = reporter();
    for i in 0..50 {
        reporter.note(format!("line {i}"), 0, false, false);
    }
    let rendered = reporter.render(0);
    // max_lines=5, only the last 5 lines are shown
    for i in 45..50 {
        assert!(rendered.contains(&format!("line {i}")), "missing line {i} in {rendered}");
    }
    assert!(!rendered.contains("line 40"));
}

#[tokio::test]
async fn tick_forces_edit_on_first_heartbeat() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("starting", 0, false, false);
    reporter.tick(&transport, 0).await;
    assert_eq!(transport.sent_messages().len(), 1);
}

#[tokio::test]
async fn tick_throttles_edits_within_min_edit_window() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("a", 0, false, false);
    reporter.tick(&transport, 0).await;
    reporter.note("b", 200, false, false);
    reporter.tick(&transport, 200).await; // well under min_edit of 1000ms
    assert_eq!(transport.sent_messages().len(), 1);
}

#[tokio::test]
async fn tick_edits_again_once_min_edit_elapses_and_dirty() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("a", 0, false, false);
    reporter.tick(&transport, 0).await;
    reporter.note("b", 2_000, false, false);
    reporter.tick(&transport, 2_000).await;
    assert_eq!(transport.sent_messages().len(), 2);
}

#[tokio::test]
async fn tick_forces_edit_once_heartbeat_elapses_even_if_not_dirty() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("a", 0, false, false);
    reporter.tick(&transport, 0).await;
    reporter.tick(&transport, 31_000).await;
    assert_eq!(transport.sent_messages().len(), 2);
}

#[tokio::test]
async fn stall_warning_injected_once_idle_past_threshold() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("a", 0, false, false);
    reporter.tick(&transport, 0).await;
    reporter.tick(&transport, 61_000).await;
    let text = transport.last_text_for("chan-1").unwrap();
    assert!(text.contains("no new agent events"), "{text}");
}

#[tokio::test]
async fn milestone_is_posted_as_separate_message() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("reached a meaningful milestone", 0, false, true);
    reporter.tick(&transport, 0).await;
    let sent = transport.sent_messages();
    assert!(sent.iter().any(|m| m.text.contains("reached a meaningful milestone")));
}

#[tokio::test]
async fn milestone_with_forbidden_prefix_is_dropped() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("Thinking: about stuff", 0, false, true);
    reporter.tick(&transport, 0).await;
    let sent = transport.sent_messages();
    assert!(!sent.iter().any(|m| m.text.contains("Thinking: about stuff")));
}

#[tokio::test]
async fn second_milestone_within_backoff_window_is_dropped() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.note("first milestone reached now", 0, false, true);
    reporter.tick(&transport, 0).await;
    reporter.note("second milestone reached soon", 500, false, true);
    reporter.tick(&transport, 500).await;
    let milestone_posts = transport.sent_messages().iter().filter(|m| m.text.contains("milestone reached")).count();
    assert_eq!(milestone_posts, 1);
}

#[tokio::test]
async fn stop_performs_final_edit_and_marks_stopped() {
    let transport = FakeChatTransport::new();
    let reporter = reporter();
    reporter.stop(&transport, 0, Some("final summary")).await.unwrap();
    assert_eq!(transport.last_text_for("chan-1"), Some("final summary".to_string()));
    reporter.note("ignored after stop", 0, false, false);
    assert!(reporter.render(0).contains("no progress yet") || !reporter.render(0).contains("ignored after stop"));
}
