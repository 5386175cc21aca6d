// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `codex exec` / `codex exec resume` backend: argv assembly and a
//! one-shot NDJSON-streaming `AgentCliAdapter` implementation.

use super::{AgentCliAdapter, AgentError, AgentRunOutcome, AgentSpawnConfig, ProgressNote, Provider};
use async_trait::async_trait;

pub const PROGRAM: &str = "codex";

/// Builds the argv for one of the three documented codex invocation
/// shapes (resume / fresh / ephemeral), per §6:
/// - resume: `exec [--sandbox M] resume <sid> [--skip-git-repo-check] [shared] --json <prompt>`
/// - fresh: `exec [--skip-git-repo-check] --cd <wd> [--sandbox M] [shared] --json <prompt>`
/// - ephemeral: `exec [shared] --ephemeral --json <prompt>`
pub fn build_argv(config: &AgentSpawnConfig) -> Vec<String> {
    assert_eq!(config.provider, Provider::Codex);
    let mut argv = vec!["exec".to_string()];

    if config.ephemeral {
        push_shared_flags(&mut argv, config);
        argv.push("--ephemeral".to_string());
        argv.push("--json".to_string());
        argv.push(config.prompt.clone());
        return argv;
    }

    if let Some(sandbox) = &config.sandbox_mode {
        argv.push("--sandbox".to_string());
        argv.push(sandbox.clone());
    }

    if let Some(session_id) = &config.resume_session_id {
        argv.push("resume".to_string());
        argv.push(session_id.clone());
        if config.skip_git_repo_check {
            argv.push("--skip-git-repo-check".to_string());
        }
        push_shared_flags(&mut argv, config);
    } else {
        if config.skip_git_repo_check {
            argv.push("--skip-git-repo-check".to_string());
        }
        argv.push("--cd".to_string());
        argv.push(config.workdir.display().to_string());
        push_shared_flags(&mut argv, config);
    }

    argv.push("--json".to_string());
    argv.push(config.prompt.clone());
    argv
}

/// Feature flags become `-c key=value` overrides; approval policy is an
/// override, not a dedicated flag.
fn push_shared_flags(argv: &mut Vec<String>, config: &AgentSpawnConfig) {
    for (key, value) in &config.extra_feature_flags {
        argv.push("-c".to_string());
        argv.push(format!("{key}={value}"));
    }
    if let Some(policy) = &config.approval_policy {
        argv.push("-c".to_string());
        argv.push(format!("approval_policy={policy}"));
    }
}

/// Substring match documented for the codex backend's stale-session error.
pub fn is_stale_session_error(stderr_tail: &str) -> bool {
    stderr_tail.contains("No conversation found with session ID")
}

/// Network/proxy/empty-exit-1/5xx patterns documented as codex's
/// transient-runtime-error class.
pub fn is_transient_runtime_error(exit_code: i32, stderr_tail: &str) -> bool {
    if exit_code == 1 && stderr_tail.trim().is_empty() {
        return true;
    }
    let needle_hits = ["proxy", "network", "ECONNRESET", "502", "503", "504"];
    needle_hits.iter().any(|needle| stderr_tail.contains(needle))
}

pub struct CodexAgentAdapter;

#[async_trait]
impl AgentCliAdapter for CodexAgentAdapter {
    async fn run(
        &self,
        config: AgentSpawnConfig,
        on_progress: &(dyn Fn(ProgressNote) + Send + Sync),
        on_spawn: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<AgentRunOutcome, AgentError> {
        let argv = build_argv(&config);
        crate::agent::stream_child(PROGRAM, &argv, &config, on_progress, on_spawn).await
    }
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
