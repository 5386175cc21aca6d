// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_thread_started() {
    let (_, event) = parse_line(r#"{"type":"thread_started","thread_id":"T1"}"#).unwrap();
    assert!(matches!(event, AgentEvent::ThreadStarted { thread_id } if thread_id == "T1"));
}

#[test]
fn parses_item_completed() {
    let (_, event) =
        parse_line(r#"{"type":"item_completed","item_type":"agent_message","text":"hello"}"#).unwrap();
    match event {
        AgentEvent::ItemCompleted { item_type, text } => {
            assert_eq!(item_type, "agent_message");
            assert_eq!(text.as_deref(), Some("hello"));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn unrecognized_json_shape_becomes_other() {
    let (_, event) = parse_line(r#"{"type":"something_new","foo":1}"#).unwrap();
    assert!(matches!(event, AgentEvent::Other));
}

#[test]
fn non_json_line_returns_none() {
    assert!(parse_line("not json at all").is_none());
}

#[test]
fn blank_line_returns_none() {
    assert!(parse_line("   ").is_none());
}

#[test]
fn extract_session_id_prefers_thread_started_field() {
    let (raw, event) = parse_line(r#"{"type":"thread_started","thread_id":"T1"}"#).unwrap();
    assert_eq!(extract_session_id(&event, &raw).as_deref(), Some("T1"));
}

#[test]
fn extract_session_id_falls_back_to_raw_session_id() {
    let (raw, event) =
        parse_line(r#"{"type":"assistant","text":"hi","session_id":"S9"}"#).unwrap();
    assert_eq!(extract_session_id(&event, &raw).as_deref(), Some("S9"));
}
