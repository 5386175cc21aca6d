// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The whole-document state blob: every session, keyed by conversation key,
//! persisted atomically as a single JSON document (component B).

use relay_core::agent_run::PostRestartNotice;
use relay_core::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk schema version. Bumped whenever a normalizer needs to
/// distinguish "never written" from "written by an older build."
pub const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub sessions: BTreeMap<String, Session>,
}

fn default_schema_version() -> u32 {
    STATE_SCHEMA_VERSION
}

impl Default for State {
    fn default() -> Self {
        Self { schema_version: STATE_SCHEMA_VERSION, sessions: BTreeMap::new() }
    }
}

impl State {
    pub fn session(&self, conversation_key: &str) -> Option<&Session> {
        self.sessions.get(conversation_key)
    }

    pub fn session_mut(&mut self, conversation_key: &str) -> Option<&mut Session> {
        self.sessions.get_mut(conversation_key)
    }

    /// Gets the session for `conversation_key`, creating one lazily under
    /// `workdir` if this is the first message seen for that conversation.
    pub fn session_or_create(&mut self, conversation_key: &str, workdir: std::path::PathBuf) -> &mut Session {
        self.sessions
            .entry(conversation_key.to_string())
            .or_insert_with(|| Session::new(conversation_key, workdir))
    }

    /// Runs the on-load normalizer pass over every session: demotes any
    /// `Running` task back to `Pending`, resets the task loop to idle, and
    /// clears in-flight `AgentRun`s, collecting one post-restart notice per
    /// run that was interrupted. Also re-instates job watchers for jobs
    /// that were `Running` with a known channel id (returned separately so
    /// the caller can schedule them without this crate depending on the
    /// watcher engine).
    pub fn normalize(&mut self) -> Vec<PostRestartNotice> {
        let mut notices = Vec::new();
        for session in self.sessions.values_mut() {
            if let Some(notice) = session.normalize_on_load() {
                notices.push(notice);
            }
        }
        notices
    }

    /// Jobs left `Running` across a restart, paired with their owning
    /// conversation key, for the caller to re-instate watchers against.
    pub fn jobs_needing_watch_reinstatement(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (conv_key, session) in &self.sessions {
            for job in &session.jobs {
                if job.status == relay_core::job::JobStatus::Running {
                    pairs.push((conv_key.clone(), job.id.clone()));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
