// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::Provider;
use std::path::PathBuf;

fn base_config() -> AgentSpawnConfig {
    AgentSpawnConfig::new(Provider::Codex, "do the thing", PathBuf::from("/work/repo"))
}

#[test]
fn fresh_run_includes_cd_and_json() {
    let config = base_config();
    let argv = build_argv(&config);
    assert_eq!(argv[0], "exec");
    assert!(argv.contains(&"--cd".to_string()));
    assert!(argv.contains(&"/work/repo".to_string()));
    assert!(argv.contains(&"--json".to_string()));
    assert_eq!(argv.last().unwrap(), "do the thing");
}

#[test]
fn resume_run_uses_resume_subcommand_not_cd() {
    let mut config = base_config();
    config.resume_session_id = Some("sess-123".to_string());
    config.sandbox_mode = Some("workspace-write".to_string());
    let argv = build_argv(&config);
    assert_eq!(argv[0], "exec");
    assert!(argv.contains(&"--sandbox".to_string()));
    assert!(argv.contains(&"resume".to_string()));
    assert!(argv.contains(&"sess-123".to_string()));
    assert!(!argv.contains(&"--cd".to_string()));
}

#[test]
fn ephemeral_run_skips_resume_and_cd() {
    let mut config = base_config();
    config.ephemeral = true;
    let argv = build_argv(&config);
    assert!(argv.contains(&"--ephemeral".to_string()));
    assert!(!argv.contains(&"--cd".to_string()));
    assert!(!argv.contains(&"resume".to_string()));
}

#[test]
fn feature_flags_and_approval_policy_become_dash_c_overrides() {
    let mut config = base_config();
    config.extra_feature_flags.push(("foo".to_string(), "bar".to_string()));
    config.approval_policy = Some("never".to_string());
    let argv = build_argv(&config);
    let c_positions: Vec<usize> = argv.iter().enumerate().filter(|(_, a)| a.as_str() == "-c").map(|(i, _)| i).collect();
    assert_eq!(c_positions.len(), 2);
    assert!(argv.contains(&"foo=bar".to_string()));
    assert!(argv.contains(&"approval_policy=never".to_string()));
}

#[test]
fn skip_git_repo_check_flag_present_by_default() {
    let config = base_config();
    let argv = build_argv(&config);
    assert!(argv.contains(&"--skip-git-repo-check".to_string()));
}

#[test]
fn stale_session_error_matches_documented_substring() {
    assert!(is_stale_session_error("Error: No conversation found with session ID abc"));
    assert!(!is_stale_session_error("Error: permission denied"));
}

#[test]
fn transient_runtime_error_matches_empty_exit_one_and_network_patterns() {
    assert!(is_transient_runtime_error(1, ""));
    assert!(is_transient_runtime_error(1, "upstream connect error: 503"));
    assert!(!is_transient_runtime_error(1, "syntax error near unexpected token"));
}
