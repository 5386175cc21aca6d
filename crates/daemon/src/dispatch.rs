// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turns one inbound chat message into a command parse, a local-state
//! handle, and whatever follow-up [`Intent`] demands: running the primary
//! agent, answering a priority question, starting the task loop, or
//! stepping a bound research project. Mirrors the teacher's
//! `listener::mutations`/`listener::commands` split: parse and validate
//! here, execute against the shared collaborators the listener owns.

use crate::Daemon;
use relay_adapters::{ChatTransport, OutboundMessage};
use relay_core::markers::Marker;
use relay_core::session::Session;
use relay_engine::bootstrap::{BootstrapConfig, CURRENT_BOOTSTRAP_VERSION};
use relay_engine::commands::{self, Intent};
use relay_engine::relay_actions::{self, RelayActionsConfig};
use relay_engine::research::{self, ManagerStepInputs};
use relay_engine::runner::RunRequest;
use relay_engine::priority_question::AskRequest;
use relay_engine::task_runner::{self, TaskRunnerConfig};

/// Handles exactly one inbound message: takes the conversation's session
/// out of shared state for the duration of the dispatch (so the async
/// command handling never holds the state lock across an `.await`),
/// applies every effect, then puts the session back and persists.
pub async fn dispatch_message(daemon: &Daemon, conversation_key: &str, channel_id: &str, text: &str) {
    let now_ms = daemon.clock.epoch_ms();

    let mut session = take_or_create_session(daemon, conversation_key).await;
    session.last_channel_id = Some(channel_id.to_string());

    let (reply, intent) = if text.starts_with('/') {
        match commands::parse(text) {
            Ok(command) => match commands::handle(command, &mut session, &daemon.layout, now_ms).await {
                Ok(pair) => pair,
                Err(err) => (format!("error: {err}"), None),
            },
            Err(message) => (message, None),
        }
    } else {
        (String::new(), Some(Intent::RunAgent { prompt: text.to_string() }))
    };

    if !reply.is_empty() {
        let _ = daemon
            .transport
            .send_message(OutboundMessage { channel_id: channel_id.to_string(), text: reply })
            .await;
    }

    if let Some(intent) = intent {
        apply_intent(daemon, &mut session, conversation_key, channel_id, intent, now_ms).await;
    }

    daemon.state.lock().sessions.insert(conversation_key.to_string(), session);
    if let Err(err) = daemon.save_state() {
        tracing::warn!(%err, "failed to persist state after dispatch");
    }
}

async fn take_or_create_session(daemon: &Daemon, conversation_key: &str) -> Session {
    if let Some(session) = daemon.state.lock().sessions.remove(conversation_key) {
        return session;
    }
    let workdir = daemon.config.state_dir.join("workdirs").join(conversation_key.replace([':', '/'], "_"));
    let _ = tokio::fs::create_dir_all(&workdir).await;
    Session::new(conversation_key, workdir)
}

async fn apply_intent(daemon: &Daemon, session: &mut Session, conversation_key: &str, channel_id: &str, intent: Intent, now_ms: u64) {
    match intent {
        Intent::RunAgent { prompt } => run_agent(daemon, session, conversation_key, channel_id, prompt, now_ms).await,
        Intent::Ask { question } => run_ask(daemon, session, conversation_key, channel_id, question).await,
        Intent::Inject { prompt } => {
            // Kill whatever is actually running first: bumping the epoch
            // only stops new work from being chained onto this
            // conversation's PCQ lane, it does not touch an in-flight
            // child. Then invalidate the lane and rerun with the new
            // prompt.
            if let Some(pid) = daemon.active_pids.get(conversation_key) {
                relay_adapters::signals::terminate_process_group(pid);
            }
            daemon.pcq.preempt(conversation_key);
            session.task_loop.request_stop();
            run_agent(daemon, session, conversation_key, channel_id, prompt, now_ms).await;
        }
        Intent::StartTaskLoop => run_task_loop(daemon, session, channel_id).await,
        Intent::ResearchStep => run_research_step(daemon, session, now_ms).await,
    }
}

async fn run_agent(daemon: &Daemon, session: &mut Session, conversation_key: &str, channel_id: &str, prompt: String, _now_ms: u64) {
    let request = RunRequest {
        conversation_key: conversation_key.to_string(),
        channel_id: channel_id.to_string(),
        provider: daemon.default_provider,
        prompt,
        resume_session_id: session.external_session_id.clone(),
        workdir: session.workdir.clone(),
        model: None,
    };
    let bootstrap = BootstrapConfig::default();

    match daemon.runner.run(request, session.bootstrap_version, &bootstrap).await {
        Ok(outcome) => {
            if let Some(session_id) = outcome.session_id {
                session.external_session_id = Some(session_id);
            }
            if outcome.bumped_bootstrap {
                session.bootstrap_version = CURRENT_BOOTSTRAP_VERSION;
            }
            let start_task_runner = apply_relay_action_markers(daemon, session, conversation_key, &outcome.markers).await;
            if start_task_runner {
                run_task_loop(daemon, session, channel_id).await;
            }
        }
        Err(err) => {
            let _ = daemon
                .transport
                .send_message(OutboundMessage { channel_id: channel_id.to_string(), text: format!("error: {err}") })
                .await;
        }
    }
}

/// Parses `[[relay-actions]]` blocks out of a reply's markers and dispatches
/// them against the session. Returns whether the dispatch requested the
/// task loop be (re)started.
async fn apply_relay_action_markers(daemon: &Daemon, session: &mut Session, conversation_key: &str, markers: &[Marker]) -> bool {
    let parsed = relay_actions::parse(markers);
    for error in &parsed.errors {
        tracing::warn!(%error, "rejected relay-actions block");
    }
    if parsed.actions.is_empty() {
        return false;
    }

    let config = RelayActionsConfig {
        enabled: daemon.config.relay_actions_enabled,
        dm_only: daemon.config.relay_actions_dm_only,
        max_per_message: daemon.config.relay_actions_max_per_message,
        wait_pattern_guard_mode: daemon.config.wait_pattern_guard_mode,
        workdir_allow_roots: daemon.config.workdir_allow_roots.clone(),
    };
    let is_dm = conversation_key.starts_with("dm:");
    let now_ms = daemon.clock.epoch_ms();

    match relay_actions::dispatch(session, &daemon.layout, parsed.actions, &config, is_dm, now_ms).await {
        Ok(report) => report.start_task_runner,
        Err(err) => {
            tracing::warn!(%err, "relay-action dispatch failed");
            false
        }
    }
}

async fn run_ask(daemon: &Daemon, session: &Session, conversation_key: &str, channel_id: &str, question: String) {
    let job_summaries = session.jobs.iter().map(|job| format!("{} [{:?}] {}", job.id, job.status, job.command)).collect();
    let log_path = session.running_job().map(|job| job.paths.log_path.clone());

    let request = AskRequest {
        conversation_key: conversation_key.to_string(),
        channel_id: channel_id.to_string(),
        question,
        provider: daemon.default_provider,
        workdir: session.workdir.clone(),
        active_root_pid: daemon.active_pids.get(conversation_key),
        job_summaries,
        log_path,
    };

    if let Err(err) = daemon.priority_question.ask(request).await {
        let _ = daemon
            .transport
            .send_message(OutboundMessage { channel_id: channel_id.to_string(), text: format!("error: {err}") })
            .await;
    }
}

pub(crate) async fn run_task_loop(daemon: &Daemon, session: &mut Session, channel_id: &str) {
    let bootstrap = BootstrapConfig::default();
    let config = TaskRunnerConfig {
        provider: daemon.default_provider,
        channel_id: channel_id.to_string(),
        auto_commit: false,
        commit_subject_prefix: "auto".to_string(),
        stop_on_error: true,
        auto_handoff_after_each_task: false,
        handoff_hook: None,
    };
    task_runner::run_loop(session, &daemon.runner, daemon.clock.as_ref(), &config, &bootstrap).await;
}

pub(crate) async fn run_research_step(daemon: &Daemon, session: &Session, now_ms: u64) {
    let Some(binding) = session.research.clone() else { return };
    let Ok(Some(mut project)) = research::load_project_state(&binding.project_root).await else {
        return;
    };

    let mut manager_session = daemon
        .state
        .lock()
        .sessions
        .remove(&binding.manager_conv_key)
        .unwrap_or_else(|| Session::new(binding.manager_conv_key.clone(), binding.project_root.clone()));

    let inputs = ManagerStepInputs {
        provider: daemon.default_provider,
        manager_conv_key: binding.manager_conv_key.clone(),
        project_root: binding.project_root.clone(),
        holder: "daemon".to_string(),
        lease_token: uuid::Uuid::new_v4().to_string(),
        manual_mode: true,
        active_research_job_running: manager_session.running_job().is_some(),
        feedback_events: Vec::new(),
        now_ms,
    };

    match research::run_manager_step(&mut project, &mut manager_session, daemon.priority_question.adapter.as_ref(), &daemon.layout, inputs).await {
        Ok(outcome) => {
            if let Some(reason) = &outcome.failure {
                tracing::warn!(%reason, "research manager step failed");
            }
        }
        Err(err) => tracing::warn!(%err, "research manager step errored"),
    }

    if let Err(err) = research::save_project_state(&binding.project_root, &project).await {
        tracing::warn!(%err, "failed to persist research project state");
    }
    daemon.state.lock().sessions.insert(binding.manager_conv_key.clone(), manager_session);
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
