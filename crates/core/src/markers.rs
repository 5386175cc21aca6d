// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single tokenizer for every out-of-band marker the agent can emit in
//! free text: `[[upload:path]]`, `[[relay-actions]]{json}[[/relay-actions]]`,
//! `[[research-decision]]{json}[[/research-decision]]`, and
//! `[[task:done]]`/`[[task:blocked]]`. One pass produces the cleaned,
//! user-visible text plus the list of markers found; each marker type has
//! its own downstream validator/executor.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Upload { path: String },
    RelayActions { json: String },
    ResearchDecision { json: String },
    TaskDone,
    TaskBlocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeResult {
    pub cleaned_text: String,
    pub markers: Vec<Marker>,
}

// Allow expect here as every pattern below is a compile-time constant
// already verified valid.
#[allow(clippy::expect_used)]
fn upload_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[\[upload:([^\]]+)\]\]").expect("constant regex pattern is valid"))
}

#[allow(clippy::expect_used)]
fn relay_actions_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[\[relay-actions\]\](.*?)\[\[/relay-actions\]\]").expect("constant regex pattern is valid")
    })
}

#[allow(clippy::expect_used)]
fn research_decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\[\[research-decision\]\](.*?)\[\[/research-decision\]\]")
            .expect("constant regex pattern is valid")
    })
}

#[allow(clippy::expect_used)]
fn task_done_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[\[task:done\]\]").expect("constant regex pattern is valid"))
}

#[allow(clippy::expect_used)]
fn task_blocked_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[\[task:blocked\]\]").expect("constant regex pattern is valid"))
}

/// Strips a wrapping code fence (```...```/```json...```) if present, the
/// same leniency the relay-action payloads are documented to need.
fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed.strip_prefix("```") {
        let inner = inner.trim_start_matches("json").trim_start_matches('\n');
        if let Some(body) = inner.strip_suffix("```") {
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Tokenizes agent output. `research_mode` controls whether
/// `[[research-decision]]` blocks are recognized: per §6, they are parsed
/// ONLY inside a research manager step and otherwise ignored (fail-closed).
pub fn tokenize(text: &str, research_mode: bool) -> TokenizeResult {
    let mut markers = Vec::new();
    let mut cleaned = text.to_string();

    cleaned = relay_actions_re()
        .replace_all(&cleaned, |caps: &regex::Captures| {
            markers.push(Marker::RelayActions { json: strip_code_fence(&caps[1]) });
            String::new()
        })
        .to_string();

    if research_mode {
        cleaned = research_decision_re()
            .replace_all(&cleaned, |caps: &regex::Captures| {
                markers.push(Marker::ResearchDecision { json: strip_code_fence(&caps[1]) });
                String::new()
            })
            .to_string();
    }

    cleaned = upload_re()
        .replace_all(&cleaned, |caps: &regex::Captures| {
            markers.push(Marker::Upload { path: caps[1].trim().to_string() });
            String::new()
        })
        .to_string();

    let has_blocked = task_blocked_re().is_match(&cleaned);
    let has_done = task_done_re().is_match(&cleaned);
    cleaned = task_blocked_re().replace_all(&cleaned, "").to_string();
    cleaned = task_done_re().replace_all(&cleaned, "").to_string();

    // Blocked takes precedence over done when both are present (Open
    // Question 1: the source's undocumented behavior, kept and surfaced).
    if has_blocked {
        markers.push(Marker::TaskBlocked);
    } else if has_done {
        markers.push(Marker::TaskDone);
    }

    TokenizeResult { cleaned_text: cleaned.trim().to_string(), markers }
}

/// Task-runner interpretation of a tokenized reply: absence of both
/// markers is treated as `done` (the legacy lenient rule, kept
/// behavior-preserving; see Open Question 2).
pub fn task_outcome_lenient(markers: &[Marker]) -> Marker {
    if markers.iter().any(|m| matches!(m, Marker::TaskBlocked)) {
        Marker::TaskBlocked
    } else {
        Marker::TaskDone
    }
}

#[cfg(test)]
#[path = "markers_tests.rs"]
mod tests;
