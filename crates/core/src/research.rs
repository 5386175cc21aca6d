// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Research manager state: project binding, lease, and idempotent decision
//! application state machine.

use serde::{Deserialize, Serialize};

/// How long an acquired lease remains valid without renewal.
pub const LEASE_TTL_MS: u64 = 5 * 60 * 1000;

/// How long an `InflightStep` may sit `Running` before it is presumed dead.
pub const INFLIGHT_TTL_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchBinding {
    pub enabled: bool,
    pub project_root: std::path::PathBuf,
    pub slug: String,
    pub manager_conv_key: String,
    pub last_note_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Paused,
    Running,
    Blocked,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Plan,
    Wait,
    Analyze,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflightStatus {
    Idle,
    Running,
    Applied,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Budgets {
    pub max_steps: u32,
    pub max_wall_clock_minutes: u32,
    pub max_runs: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub steps: u32,
    pub runs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub holder: String,
    pub token: String,
    pub acquired_at_ms: u64,
    pub expires_at_ms: u64,
}

impl Lease {
    pub fn is_active(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflightStep {
    pub step_id: String,
    pub decision_hash: String,
    pub status: InflightStatus,
    pub started_at_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportingMeta {
    pub last_digest_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProjectState {
    pub version: u32,
    pub project_root: std::path::PathBuf,
    pub goal: String,
    pub status: ResearchStatus,
    pub phase: ResearchPhase,
    pub auto_run: bool,
    pub budgets: Budgets,
    pub counters: Counters,
    pub lease: Option<Lease>,
    pub inflight_step: Option<InflightStep>,
    pub applied_decision_hashes: Vec<String>,
    pub applied_action_keys: Vec<String>,
    pub reporting: ReportingMeta,
}

impl ResearchProjectState {
    pub fn new(project_root: std::path::PathBuf, goal: impl Into<String>, budgets: Budgets) -> Self {
        Self {
            version: 1,
            project_root,
            goal: goal.into(),
            status: ResearchStatus::Paused,
            phase: ResearchPhase::Plan,
            auto_run: false,
            budgets,
            counters: Counters::default(),
            lease: None,
            inflight_step: None,
            applied_decision_hashes: Vec::new(),
            applied_action_keys: Vec::new(),
            reporting: ReportingMeta::default(),
        }
    }

    /// Repairs stale lease/inflight state. Called at the top of every
    /// manager step, before any other check.
    pub fn repair_stale(&mut self, now_ms: u64) {
        if let Some(lease) = &self.lease {
            if !lease.is_active(now_ms) {
                self.lease = None;
            }
        }
        let expired = self
            .inflight_step
            .as_ref()
            .map(|step| {
                step.status == InflightStatus::Running
                    && now_ms.saturating_sub(step.started_at_ms) > INFLIGHT_TTL_MS
            })
            .unwrap_or(false);
        if expired {
            if let Some(step) = &mut self.inflight_step {
                step.status = InflightStatus::Failed;
                step.error = Some("inflight step exceeded TTL".to_string());
            }
            self.status = ResearchStatus::Blocked;
        }
    }

    /// Whether a manager step is permitted to run right now, per the
    /// refusal conditions in the manager step contract.
    pub fn can_run_step(&self, active_research_job_running: bool) -> bool {
        if self.status == ResearchStatus::Done {
            return false;
        }
        if self.status == ResearchStatus::Blocked {
            return false;
        }
        if self.budget_exceeded() {
            return false;
        }
        if active_research_job_running {
            return false;
        }
        true
    }

    pub fn budget_exceeded(&self) -> bool {
        (self.budgets.max_steps > 0 && self.counters.steps >= self.budgets.max_steps)
            || (self.budgets.max_runs > 0 && self.counters.runs >= self.budgets.max_runs)
    }

    pub fn acquire_lease(&mut self, holder: impl Into<String>, token: impl Into<String>, now_ms: u64) -> bool {
        if let Some(lease) = &self.lease {
            if lease.is_active(now_ms) {
                return false;
            }
        }
        self.lease = Some(Lease {
            holder: holder.into(),
            token: token.into(),
            acquired_at_ms: now_ms,
            expires_at_ms: now_ms + LEASE_TTL_MS,
        });
        true
    }

    pub fn release_lease(&mut self) {
        self.lease = None;
    }

    /// Rejects a duplicate decision hash as an idempotent no-op, returning
    /// whether the hash was newly recorded.
    pub fn record_decision_hash(&mut self, hash: impl Into<String>) -> bool {
        let hash = hash.into();
        if self.applied_decision_hashes.contains(&hash) {
            return false;
        }
        self.applied_decision_hashes.push(hash);
        true
    }

    /// Rejects a duplicate action idempotency key, returning whether the
    /// key was newly recorded.
    pub fn record_action_key(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.applied_action_keys.contains(&key) {
            return false;
        }
        self.applied_action_keys.push(key);
        true
    }
}

#[cfg(test)]
#[path = "research_tests.rs"]
mod tests;
