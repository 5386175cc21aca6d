// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon: wires a [`ChatTransport`] to the engine and owns the
//! process-level event loop. One [`Daemon`] per process; one [`Pcq`] lane,
//! one set of job watchers, and one research ticker per conversation,
//! mirroring the teacher's top-level daemon struct that owns the state,
//! event bus, and background task handles.

pub mod dispatch;
pub mod watch_loop;

use parking_lot::Mutex as SyncMutex;
use relay_adapters::agent::{claude::ClaudeAgentAdapter, codex::CodexAgentAdapter};
use relay_adapters::{AgentCliAdapter, AgentError, AgentRunOutcome, AgentSpawnConfig, ChatTransport, ProgressNote, Provider};
use relay_core::clock::{Clock, SystemClock};
use relay_core::config::Config;
use relay_engine::interrupt_buffer::InterruptSnapshotBuffer;
use relay_engine::pcq::Pcq;
use relay_engine::priority_question::{PriorityQuestionRunner, PriorityQuestionState};
use relay_engine::progress::ProgressConfig;
use relay_engine::retry::AgentAwareConfig;
use relay_engine::runner::{ActivePids, AgentRunner};
use relay_storage::paths::Layout;
use relay_storage::state::State;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Routes a spawn request to the concrete adapter named by
/// `config.provider`. The teacher has no analogue for this (it drives a
/// single backend); this is new plumbing required because [`AgentRunner`]
/// is built against exactly one [`AgentCliAdapter`], but this relay must
/// support both `codex` and `claude` child CLIs.
pub struct RoutingAgentAdapter {
    codex: CodexAgentAdapter,
    claude: ClaudeAgentAdapter,
}

impl Default for RoutingAgentAdapter {
    fn default() -> Self {
        Self { codex: CodexAgentAdapter, claude: ClaudeAgentAdapter }
    }
}

#[async_trait::async_trait]
impl AgentCliAdapter for RoutingAgentAdapter {
    async fn run(
        &self,
        config: AgentSpawnConfig,
        on_progress: &(dyn Fn(ProgressNote) + Send + Sync),
        on_spawn: &(dyn Fn(u32) + Send + Sync),
    ) -> Result<AgentRunOutcome, AgentError> {
        match config.provider {
            Provider::Codex => self.codex.run(config, on_progress, on_spawn).await,
            Provider::Claude => self.claude.run(config, on_progress, on_spawn).await,
        }
    }
}

/// Everything the event loop needs, built once at startup and shared
/// across every conversation's dispatch.
pub struct Daemon {
    pub config: Config,
    pub layout: Layout,
    pub state: SyncMutex<State>,
    pub transport: Arc<dyn ChatTransport>,
    pub clock: Arc<dyn Clock>,
    pub pcq: Arc<Pcq>,
    pub runner: AgentRunner,
    pub priority_question: PriorityQuestionRunner,
    pub default_provider: Provider,
    /// Same handle as `runner.active_pids`, kept as its own field so
    /// `dispatch.rs` can read the active child's pid for `/ask` and `/inject`
    /// without reaching through `runner`.
    pub active_pids: ActivePids,
    /// Per-`(conversation_key, job_id)` watcher ring state, kept here
    /// rather than on `Job` itself since it is ephemeral (never persisted).
    pub watcher_states: SyncMutex<HashMap<(String, String), relay_engine::job_watcher::WatcherState>>,
    /// Last time the auto research ticker submitted a manager step per
    /// conversation, for `research::due_for_tick`'s cooldown check.
    pub research_tick_at: SyncMutex<HashMap<String, u64>>,
}

impl Daemon {
    pub fn new(config: Config, transport: Arc<dyn ChatTransport>) -> Self {
        let layout = Layout::new(config.state_dir.clone());
        let state = State::default();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let adapter: Arc<dyn AgentCliAdapter> = Arc::new(RoutingAgentAdapter::default());
        let pcq = Arc::new(Pcq::new());
        let interrupt_buffer = Arc::new(InterruptSnapshotBuffer::new());
        let active_pids = ActivePids::new();

        let runner = AgentRunner {
            adapter: adapter.clone(),
            transport: transport.clone(),
            pcq: pcq.clone(),
            interrupt_buffer: interrupt_buffer.clone(),
            clock: clock.clone(),
            retry_config: AgentAwareConfig::from(&config),
            active_pids: active_pids.clone(),
            progress_config: ProgressConfig {
                min_edit: Duration::from_millis(config.min_edit_ms),
                heartbeat: Duration::from_millis(config.heartbeat_ms),
                edit_timeout: Duration::from_millis(config.edit_timeout_ms),
                stall_warn: Duration::from_millis(config.stall_warn_ms),
                max_lines: config.progress_max_lines,
                agent_label: "agent".to_string(),
                timeout_label: config.agent_timeout,
            },
        };

        let priority_question = PriorityQuestionRunner {
            adapter,
            transport: transport.clone(),
            interrupt_buffer,
            state: Arc::new(PriorityQuestionState::new()),
            snapshot_recent_lines: 20,
        };

        Self {
            config,
            layout,
            state: SyncMutex::new(state),
            transport,
            clock,
            pcq,
            runner,
            priority_question,
            default_provider: Provider::Codex,
            active_pids,
            watcher_states: SyncMutex::new(HashMap::new()),
            research_tick_at: SyncMutex::new(HashMap::new()),
        }
    }

    /// Loads persisted state from disk, running the restart normalizer and
    /// returning post-restart notices so the caller can post them to chat.
    pub fn load_state(&self) -> Vec<relay_core::agent_run::PostRestartNotice> {
        let writer = relay_storage::store::FsStateWriter;
        let mut loaded = relay_storage::store::load(&writer, &self.layout.sessions_file());
        let notices = loaded.normalize();
        *self.state.lock() = loaded;
        notices
    }

    pub fn save_state(&self) -> Result<(), relay_storage::StoreError> {
        let writer = relay_storage::store::FsStateWriter;
        let snapshot = self.state.lock().clone();
        relay_storage::store::save(&writer, &self.layout.sessions_file(), &snapshot)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
