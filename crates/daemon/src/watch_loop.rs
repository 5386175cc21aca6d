// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background ticking: one pass over every session's running jobs (Component
//! I's watcher), and one pass deciding which bound research projects are due
//! for an auto manager step. Both are invoked periodically by `main`'s event
//! loop, mirroring the teacher's periodic checkpoint/flush background tasks.

use crate::dispatch;
use crate::Daemon;
use relay_core::job::JobStatus;
use relay_core::task::{Task, TaskStatus};
use relay_engine::job_watcher::{self, JobWatcherConfig, ResearchPostJob};
use relay_engine::research;

const RESEARCH_TICK_COOLDOWN_MS: u64 = 90_000;

fn job_watcher_config(daemon: &Daemon) -> JobWatcherConfig {
    JobWatcherConfig {
        tail_byte_cap: 4_000,
        startup_heartbeat_sec: daemon.config.startup_heartbeat_secs,
        heartbeat_every_sec: daemon.config.heartbeat_every_secs,
        stale_cpu_pct: daemon.config.stale_cpu_pct,
        stale_gpu_pct: daemon.config.stale_gpu_pct,
        stale_minutes: daemon.config.stale_minutes,
        alert_every_minutes: daemon.config.alert_every_minutes,
        compact_mode: false,
        require_files_feature_enabled: true,
        workdir_allow_roots: daemon.config.workdir_allow_roots.clone(),
    }
}

/// Ticks every running job across every conversation once.
pub async fn tick_jobs(daemon: &Daemon) {
    let conversation_keys: Vec<String> = daemon.state.lock().sessions.keys().cloned().collect();
    for conversation_key in conversation_keys {
        tick_jobs_for_conversation(daemon, &conversation_key).await;
    }
}

async fn tick_jobs_for_conversation(daemon: &Daemon, conversation_key: &str) {
    let Some(mut session) = daemon.state.lock().sessions.remove(conversation_key) else {
        return;
    };

    let now_ms = daemon.clock.epoch_ms();
    let channel_id = session.last_channel_id.clone().unwrap_or_else(|| conversation_key.to_string());
    let config = job_watcher_config(daemon);

    let running_job_ids: Vec<String> =
        session.jobs.iter().filter(|job| job.status == JobStatus::Running).map(|job| job.id.clone()).collect();

    let mut want_task_runner = false;
    let mut then_task: Option<(String, String)> = None;
    let mut research_post: Option<ResearchPostJob> = None;

    for job_id in running_job_ids {
        let Some(index) = session.jobs.iter().position(|job| job.id == job_id) else { continue };
        let mut job = session.jobs.remove(index);
        let mut watcher_state = daemon
            .watcher_states
            .lock()
            .remove(&(conversation_key.to_string(), job_id.clone()))
            .unwrap_or_default();

        let pending = session.tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
        let task_summary = format!("{pending} tasks pending");

        let outcome = job_watcher::tick(&config, daemon.transport.as_ref(), &channel_id, &mut job, &mut watcher_state, Some(task_summary.as_str()), now_ms).await;

        daemon.watcher_states.lock().insert((conversation_key.to_string(), job_id.clone()), watcher_state);
        session.jobs.push(job);

        if outcome.start_task_runner {
            want_task_runner = true;
        }
        if let Some(prompt) = outcome.then_task_prompt {
            then_task = Some((prompt, outcome.then_task_source_job.unwrap_or(job_id)));
        }
        if let Some(post) = outcome.research_post_job {
            research_post = Some(post);
        }
    }

    if let Some((prompt, source_job)) = then_task {
        let id = session.allocate_task_id();
        session.tasks.push(Task::new(id, format!("follow-up for job {source_job}"), prompt, now_ms));
        want_task_runner = true;
    }

    if let Some(post) = research_post {
        apply_research_post_job(&session, &post, now_ms).await;
    }

    if want_task_runner && !session.task_loop.running {
        dispatch::run_task_loop(daemon, &mut session, &channel_id).await;
    }

    daemon.state.lock().sessions.insert(conversation_key.to_string(), session);
}

async fn apply_research_post_job(session: &relay_core::session::Session, post: &ResearchPostJob, now_ms: u64) {
    let Some(binding) = &session.research else { return };
    if binding.project_root != post.project_root {
        return;
    }
    let Ok(Some(mut project)) = research::load_project_state(&post.project_root).await else { return };
    research::apply_post_job(&mut project, post, now_ms).await;
    let _ = research::save_project_state(&post.project_root, &project).await;
}

/// Steps every bound research project whose cooldown has elapsed.
pub async fn tick_research(daemon: &Daemon) {
    let conversation_keys: Vec<String> = daemon.state.lock().sessions.keys().cloned().collect();
    let now_ms = daemon.clock.epoch_ms();

    for conversation_key in conversation_keys {
        let Some((project_root, active_job_running)) = (|| {
            let state = daemon.state.lock();
            let session = state.sessions.get(&conversation_key)?;
            let binding = session.research.as_ref()?;
            if !binding.enabled {
                return None;
            }
            Some((binding.project_root.clone(), session.running_job().is_some()))
        })() else {
            continue;
        };

        let Ok(Some(project)) = research::load_project_state(&project_root).await else { continue };
        let last_tick_ms = daemon.research_tick_at.lock().get(&conversation_key).copied();

        if !research::due_for_tick(&project, project.auto_run, last_tick_ms, RESEARCH_TICK_COOLDOWN_MS, now_ms, active_job_running) {
            continue;
        }

        daemon.research_tick_at.lock().insert(conversation_key.clone(), now_ms);

        let session = daemon.state.lock().sessions.get(&conversation_key).cloned();
        if let Some(session) = session {
            dispatch::run_research_step(daemon, &session, now_ms).await;
        }
    }
}

#[cfg(test)]
#[path = "watch_loop_tests.rs"]
mod tests;
