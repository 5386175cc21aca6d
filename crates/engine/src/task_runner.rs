// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component G: the task runner ("Ralph loop"). Drains a session's pending
//! task queue back through the agent runner, interpreting
//! `[[task:done]]`/`[[task:blocked]]` markers to decide what runs next.

use crate::bootstrap::BootstrapConfig;
use crate::runner::{AgentRunner, RunRequest};
use crate::EngineError;
use relay_adapters::Provider;
use relay_core::clock::Clock;
use relay_core::markers::{self, Marker};
use relay_core::session::Session;
use relay_core::task::TaskStatus;
use std::pin::Pin;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

/// Invoked after a task completes when `auto_handoff_after_each_task` is
/// set. Boxed so callers can supply an async closure without pulling in an
/// executor-specific future type.
pub type HandoffHook = Arc<dyn Fn() -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct TaskRunnerConfig {
    pub provider: Provider,
    pub channel_id: String,
    pub auto_commit: bool,
    pub commit_subject_prefix: String,
    pub stop_on_error: bool,
    pub auto_handoff_after_each_task: bool,
    pub handoff_hook: Option<HandoffHook>,
}

#[derive(Debug, Clone, Default)]
pub struct LoopSummary {
    pub tasks_run: usize,
    pub last_status: Option<TaskStatus>,
    pub stopped_early: bool,
}

/// Wraps a task's raw text per §4.G's fixed template.
fn wrap_task_prompt(task_id: &str, text: &str) -> String {
    format!("[TASK {task_id}]\n{text}\n\nWhen finished: summarize, use [[task:blocked]] if blocked, else [[task:done]]")
}

/// Drains `session`'s pending queue until empty, blocked, stopped, or a
/// run error occurs without `stop_on_error` continuing past it.
pub async fn run_loop(
    session: &mut Session,
    runner: &AgentRunner,
    clock: &dyn Clock,
    config: &TaskRunnerConfig,
    bootstrap: &BootstrapConfig,
) -> LoopSummary {
    session.task_loop.start();
    let mut summary = LoopSummary::default();

    loop {
        if session.task_loop.stop_requested {
            summary.stopped_early = true;
            break;
        }
        let Some(task) = session.first_pending_task_mut() else { break };
        let task_id = task.id.clone();
        let now_ms = clock.epoch_ms();
        task.start(now_ms);
        session.task_loop.current_task_id = Some(task_id.clone());
        let prompt = wrap_task_prompt(&task_id, &task.prompt);

        let request = RunRequest {
            conversation_key: session.conversation_key.clone(),
            channel_id: config.channel_id.clone(),
            provider: config.provider,
            prompt,
            resume_session_id: session.external_session_id.clone(),
            workdir: session.workdir.clone(),
            model: None,
        };

        let run_result = runner.run(request, session.bootstrap_version, bootstrap).await;
        summary.tasks_run += 1;

        match run_result {
            Ok(outcome) => {
                if outcome.bumped_bootstrap {
                    session.bootstrap_version = crate::bootstrap::CURRENT_BOOTSTRAP_VERSION;
                }
                if let Some(session_id) = outcome.session_id {
                    session.external_session_id = Some(session_id);
                }
                let reply = outcome.reply_chunks.join("\n");
                let outcome_marker = markers::task_outcome_lenient(&outcome.markers);
                let now_ms = clock.epoch_ms();
                // `task.start(now_ms)` above put exactly this task into the
                // running slot and nothing else touches it before this point.
                #[allow(clippy::expect_used)]
                let task = session.running_task_mut().expect("task just started is running");

                match outcome_marker {
                    Marker::TaskBlocked => {
                        task.finish_blocked(now_ms, reply);
                        summary.last_status = Some(TaskStatus::Blocked);
                        break;
                    }
                    _ => {
                        let title = task.description.clone();
                        task.finish_done(now_ms, reply);
                        summary.last_status = Some(TaskStatus::Done);
                        if config.auto_commit {
                            if let Err(err) = auto_commit(&session.workdir, &task_id, &title, &config.commit_subject_prefix).await {
                                warn!(error = %err, task_id, "git auto-commit failed");
                            }
                        }
                    }
                }
            }
            Err(err) => {
                let now_ms = clock.epoch_ms();
                let canceled = session.task_loop.stop_requested;
                #[allow(clippy::expect_used)]
                let task = session.running_task_mut().expect("task just started is running");
                if canceled {
                    task.cancel(now_ms);
                    summary.last_status = Some(TaskStatus::Canceled);
                } else {
                    task.finish_failed(now_ms, err.to_string());
                    summary.last_status = Some(TaskStatus::Failed);
                }
                summary.stopped_early = true;
                if config.stop_on_error || canceled {
                    break;
                }
            }
        }

        if config.auto_handoff_after_each_task {
            if let Some(hook) = &config.handoff_hook {
                hook().await;
            }
        }
    }

    session.task_loop.exit();
    info!(tasks_run = summary.tasks_run, stopped_early = summary.stopped_early, "task loop exited");
    summary
}

/// `git add -A && git commit` in `workdir`, skipped if nothing is staged.
/// Never pushes. Returns `Ok(None)` when there was nothing to commit.
async fn auto_commit(workdir: &std::path::Path, task_id: &str, title: &str, prefix: &str) -> Result<Option<String>, EngineError> {
    let add = Command::new("git").arg("add").arg("-A").current_dir(workdir).status().await?;
    if !add.success() {
        return Err(std::io::Error::other("git add failed").into());
    }

    let diff_status = Command::new("git").arg("diff").arg("--cached").arg("--quiet").current_dir(workdir).status().await?;
    if diff_status.success() {
        // Nothing staged.
        return Ok(None);
    }

    let subject = format!("{prefix}{task_id}: {title}");
    let commit = Command::new("git").arg("commit").arg("-m").arg(&subject).current_dir(workdir).status().await?;
    if !commit.success() {
        return Err(std::io::Error::other("git commit failed").into());
    }
    Ok(Some(subject))
}

#[cfg(test)]
#[path = "task_runner_tests.rs"]
mod tests;
