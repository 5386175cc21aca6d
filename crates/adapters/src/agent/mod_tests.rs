// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn provider_as_str_matches_cli_name() {
    assert_eq!(Provider::Codex.as_str(), "codex");
    assert_eq!(Provider::Claude.as_str(), "claude");
}

#[test]
fn new_spawn_config_defaults_skip_git_repo_check() {
    let config = AgentSpawnConfig::new(Provider::Codex, "hi", "/work".into());
    assert!(config.skip_git_repo_check);
    assert!(!config.ephemeral);
    assert!(config.resume_session_id.is_none());
}

#[test]
fn reconcile_prefers_longer_text_and_flags_divergence_when_both_differ() {
    let (text, diverged) = reconcile_final_text(Some("short".to_string()), Some("a much longer answer".to_string()));
    assert_eq!(text, "a much longer answer");
    assert!(diverged);
}

#[test]
fn reconcile_is_not_flagged_when_sources_agree() {
    let (text, diverged) = reconcile_final_text(Some("same".to_string()), Some("same".to_string()));
    assert_eq!(text, "same");
    assert!(!diverged);
}

#[test]
fn reconcile_falls_back_to_whichever_source_exists() {
    let (text, diverged) = reconcile_final_text(None, Some("assistant only".to_string()));
    assert_eq!(text, "assistant only");
    assert!(!diverged);

    let (text, diverged) = reconcile_final_text(Some("result only".to_string()), None);
    assert_eq!(text, "result only");
    assert!(!diverged);

    let (text, diverged) = reconcile_final_text(None, None);
    assert_eq!(text, "");
    assert!(!diverged);
}

#[test]
fn classify_failure_prefers_codex_stale_session_over_generic_exit() {
    let err = classify_failure(Provider::Codex, 1, "No conversation found with session ID xyz", None, "tail".to_string());
    assert!(matches!(err, AgentError::StaleSession(_)));
}

#[test]
fn classify_failure_falls_back_to_non_zero_exit() {
    let err = classify_failure(Provider::Codex, 2, "permission denied", None, "tail text".to_string());
    match err {
        AgentError::NonZeroExit { exit_code, tail } => {
            assert_eq!(exit_code, 2);
            assert_eq!(tail, "tail text");
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[test]
fn progress_note_for_tool_use_falls_back_to_synthetic_summary() {
    let note = progress_note_for(&AgentEvent::ToolUse { name: "shell".to_string(), summary: None }).unwrap();
    assert!(note.synthetic);
    assert!(note.text.contains("shell"));
}

#[test]
fn progress_note_for_other_event_is_none() {
    assert!(progress_note_for(&AgentEvent::Other).is_none());
}
