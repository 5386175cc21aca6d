// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §4.F step 4: context bootstrap. A fixed runtime block describing the
//! slash-command grammar, upload marker, and relay-action grammar, plus any
//! configured extra context files, prepended to the prompt once per
//! session whenever `Session.bootstrap_version` falls behind the target.

use crate::attachments::{truncate_text, truncation_mode_for, TruncationMode};
use std::path::PathBuf;

/// Bumped whenever the fixed runtime block's wording changes; a session
/// whose `bootstrap_version` is behind this gets the block reinjected.
pub const CURRENT_BOOTSTRAP_VERSION: u32 = 1;

const RUNTIME_BLOCK: &str = r#"You are operating inside a chat-relay orchestration layer. Relevant grammar:

Slash commands available to the user (not for you to emit): /help, /status, /ask, /inject, /reset, /workdir, /attach, /upload, /context, /task, /worktree, /plan, /handoff, /research, /auto, /go, /overnight, /job, /exp.

To request a file be sent back to the user, emit `[[upload:<path>]]` on its own line; the path resolves against the session workdir first, then the conversation's upload directory.

To request background job or task actions, emit a single block:
[[relay-actions]]
{"actions": [{"type": "job_start", ...}]}
[[/relay-actions]]
Supported action types: job_start, job_watch, job_stop, task_add, task_run. Only one such block per reply is honored up to the configured budget.
"#;

#[derive(Debug, Clone)]
pub struct ExtraContextFile {
    pub path: PathBuf,
    pub mode: TruncationMode,
    pub per_file_char_budget: usize,
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    pub extra_files: Vec<ExtraContextFile>,
    pub total_char_budget: usize,
}

/// True if `session_bootstrap_version` needs the runtime block reinjected.
pub fn needs_bootstrap(session_bootstrap_version: u32) -> bool {
    session_bootstrap_version < CURRENT_BOOTSTRAP_VERSION
}

/// Builds the bootstrap block: the fixed runtime grammar followed by each
/// configured extra file, truncated per its own mode/budget, all capped by
/// `config.total_char_budget` in aggregate (files are dropped, not
/// partially included, once the aggregate budget is exhausted).
pub fn build_bootstrap_block(config: &BootstrapConfig) -> String {
    let mut block = String::from(RUNTIME_BLOCK);
    let mut remaining = config.total_char_budget.saturating_sub(block.chars().count());

    for file in &config.extra_files {
        if remaining == 0 {
            break;
        }
        let Ok(contents) = std::fs::read_to_string(&file.path) else { continue };
        let budget = file.per_file_char_budget.min(remaining);
        let truncated = truncate_text(&contents, budget, file.mode);
        let label = file.path.display();
        block.push_str(&format!("\n\n--- context file: {label} ---\n{truncated}"));
        remaining = remaining.saturating_sub(truncated.chars().count());
    }

    block
}

/// Builds an [`ExtraContextFile`] from a path, inferring its truncation
/// mode from the filename the same way attachment ingest does.
pub fn extra_context_file(path: PathBuf, per_file_char_budget: usize) -> ExtraContextFile {
    let mode = path.file_name().and_then(|n| n.to_str()).map(truncation_mode_for).unwrap_or(TruncationMode::Head);
    ExtraContextFile { path, mode, per_file_char_budget }
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
