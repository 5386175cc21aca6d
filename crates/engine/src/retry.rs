// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! §4.F step 5's retry policies, expressed as an ordered list of
//! `(predicate, action)` pairs evaluated once per agent-run failure, each
//! with its own max-attempts counter (per Design Notes' redesign note).

use relay_adapters::{AgentError, AgentSpawnConfig};

/// What the runner should do in response to a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Clear the stored session id and rebuild the prompt with a "previous
    /// session could not be resumed" preface before rerunning once.
    ClearSessionAndRerun { preface: &'static str },
    /// Rerun with identical args.
    RerunSameArgs,
    /// Rerun once against the configured quota-fallback model.
    RerunWithFallbackModel { fallback_model: String },
    /// Rerun with identical args, counted against the codex transient-retry
    /// budget.
    RerunTransient,
    /// No policy matched; the failure should propagate to the caller.
    GiveUp,
}

const STALE_SESSION_PREFACE: &str = "Note: the previous agent session could not be resumed; starting a fresh one.";

/// Layer attempt budgets, tracked by the runner across the retry loop for a
/// single request. Each layer is independent: a codex transient failure and
/// a stale-session failure in the same run each get their own counter.
#[derive(Debug, Clone, Default)]
pub struct RetryBudget {
    pub stale_session_used: bool,
    pub claude_init_used: bool,
    pub claude_quota_used: bool,
    pub codex_transient_attempts: u8,
}

/// Decides the next action for `error`, consulting and mutating `budget` in
/// place. Layers are evaluated in the documented order; the first
/// applicable, not-yet-exhausted layer wins.
pub fn decide(error: &AgentError, config: &AgentAwareConfig, budget: &mut RetryBudget) -> RetryAction {
    match error {
        AgentError::StaleSession(_) if !budget.stale_session_used => {
            budget.stale_session_used = true;
            RetryAction::ClearSessionAndRerun { preface: STALE_SESSION_PREFACE }
        }
        AgentError::Transient(reason) if is_claude_init_reason(reason) && !budget.claude_init_used => {
            budget.claude_init_used = true;
            RetryAction::RerunSameArgs
        }
        AgentError::QuotaExhausted(_) if !budget.claude_quota_used => {
            budget.claude_quota_used = true;
            RetryAction::RerunWithFallbackModel { fallback_model: config.quota_fallback_model.clone() }
        }
        AgentError::Transient(_) if budget.codex_transient_attempts < config.transient_retry_max => {
            budget.codex_transient_attempts += 1;
            RetryAction::RerunTransient
        }
        _ => RetryAction::GiveUp,
    }
}

fn is_claude_init_reason(reason: &str) -> bool {
    reason.contains("system/init")
}

/// The slice of engine [`relay_core::config::Config`] the retry layer
/// needs, kept narrow so `decide` can be unit-tested without constructing a
/// full config.
#[derive(Debug, Clone)]
pub struct AgentAwareConfig {
    pub quota_fallback_model: String,
    pub transient_retry_max: u8,
}

impl From<&relay_core::config::Config> for AgentAwareConfig {
    fn from(config: &relay_core::config::Config) -> Self {
        Self {
            quota_fallback_model: config.quota_fallback_model.clone(),
            transient_retry_max: config.transient_retry_max,
        }
    }
}

/// Applies [`RetryAction::ClearSessionAndRerun`]'s prompt preface and
/// session-id clear to a spawn config in place, the way the runner does
/// before its stale-session rerun.
pub fn apply_stale_session_rerun(config: &mut AgentSpawnConfig, preface: &str) {
    config.resume_session_id = None;
    config.prompt = format!("{preface}\n\n{}", config.prompt);
}

/// Applies [`RetryAction::RerunWithFallbackModel`] to a spawn config in
/// place.
pub fn apply_fallback_model(config: &mut AgentSpawnConfig, fallback_model: String) {
    config.model = Some(fallback_model);
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
