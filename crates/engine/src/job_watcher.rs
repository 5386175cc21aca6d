// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component I: the per-job ticker. One `tick()` call drains the exit-code
//! file, detects log-tail changes, evaluates the visibility and
//! stale-progress guards, and on exit runs the finalize sub-state-machine
//! (artifact-ready gate, supervisor validation, research registry, and
//! `thenTask` dispatch).

use relay_adapters::signals;
use relay_adapters::{ChatTransport, OutboundMessage};
use relay_core::job::{CleanupSmokePolicy, Job, OnMissing, ResearchJobMeta, SupervisorGate, Visibility};
use relay_core::time_fmt::format_elapsed_ms;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct JobWatcherConfig {
    pub tail_byte_cap: usize,
    pub startup_heartbeat_sec: u64,
    pub heartbeat_every_sec: u64,
    pub stale_cpu_pct: f32,
    pub stale_gpu_pct: f32,
    pub stale_minutes: u64,
    pub alert_every_minutes: u64,
    pub compact_mode: bool,
    pub require_files_feature_enabled: bool,
    pub workdir_allow_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct WatcherState {
    pub last_tail_digest: Option<[u8; 32]>,
    pub last_change_ms: Option<u64>,
    pub last_heartbeat_post_ms: Option<u64>,
    pub last_stale_alert_ms: Option<u64>,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct ResearchPostJob {
    pub project_root: PathBuf,
    pub metrics_valid: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    pub finalized: bool,
    pub then_task_prompt: Option<String>,
    pub then_task_source_job: Option<String>,
    pub start_task_runner: bool,
    pub research_post_job: Option<ResearchPostJob>,
}

/// One watcher tick. `task_summary`, if given, is folded verbatim into the
/// compact-mode status line (the engine layer owns computing task counts
/// from the `Session`, not this module).
pub async fn tick(
    config: &JobWatcherConfig,
    transport: &dyn ChatTransport,
    channel_id: &str,
    job: &mut Job,
    state: &mut WatcherState,
    task_summary: Option<&str>,
    now_ms: u64,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    if job.exit_code.is_none() {
        if let Ok(text) = tokio::fs::read_to_string(&job.paths.exit_code_path).await {
            if let Ok(code) = text.trim().parse::<i32>() {
                job.finalize_from_exit_code(code, now_ms);
            }
        }
    }

    if job.exit_code.is_some() {
        finalize(config, transport, channel_id, job, now_ms, &mut outcome).await;
        outcome.finalized = true;
        return outcome;
    }

    let tail = tail_bytes(&job.paths.log_path, config.tail_byte_cap).await;
    let digest = sha256(&tail);
    let changed = state.last_tail_digest.as_ref() != Some(&digest);
    if changed {
        state.last_tail_digest = Some(digest);
        state.last_change_ms = Some(now_ms);
        post_tail_update(config, transport, channel_id, job, &tail, task_summary, now_ms).await;
    }

    if job.watch.long {
        evaluate_visibility_gate(config, transport, channel_id, job, state, now_ms).await;
    }

    if !changed {
        evaluate_stale_guard(config, transport, channel_id, job, state, now_ms).await;
    }

    outcome
}

async fn evaluate_visibility_gate(
    config: &JobWatcherConfig,
    transport: &dyn ChatTransport,
    channel_id: &str,
    job: &mut Job,
    state: &mut WatcherState,
    now_ms: u64,
) {
    let age_sec = now_ms.saturating_sub(job.started_at_ms) / 1000;
    if state.last_change_ms.is_none() && age_sec >= config.startup_heartbeat_sec && !state.degraded {
        job.visibility = Visibility::Degraded;
        state.degraded = true;
        post(transport, channel_id, format!("job {} produced no output within {}s, marking degraded", job.id, config.startup_heartbeat_sec)).await;
    }

    let due = state
        .last_heartbeat_post_ms
        .map(|t| now_ms.saturating_sub(t) >= config.heartbeat_every_sec * 1000)
        .unwrap_or(true);
    if due {
        state.last_heartbeat_post_ms = Some(now_ms);
        post(transport, channel_id, format!("job {} still running (elapsed {})", job.id, format_elapsed_ms(now_ms.saturating_sub(job.started_at_ms)))).await;
    }
}

async fn evaluate_stale_guard(
    config: &JobWatcherConfig,
    transport: &dyn ChatTransport,
    channel_id: &str,
    job: &Job,
    state: &mut WatcherState,
    now_ms: u64,
) {
    let elapsed_since_change_min = state.last_change_ms.map(|t| now_ms.saturating_sub(t) / 60_000).unwrap_or(0);
    if elapsed_since_change_min < config.stale_minutes {
        return;
    }
    let Some(pid) = job.pid else { return };
    let cpu = cpu_pct_for_tree(pid).await;
    let gpu = gpu_util_pct().await.unwrap_or(0.0);
    if cpu >= config.stale_cpu_pct || gpu >= config.stale_gpu_pct {
        return;
    }
    let due = state
        .last_stale_alert_ms
        .map(|t| now_ms.saturating_sub(t) >= config.alert_every_minutes * 60_000)
        .unwrap_or(true);
    if due {
        state.last_stale_alert_ms = Some(now_ms);
        post(transport, channel_id, format!("job {} output unchanged for {}min with cpu {cpu:.1}% / gpu {gpu:.1}%, may be stalled", job.id, elapsed_since_change_min)).await;
    }
}

enum ArtifactWait {
    Ready,
    TimedOut,
    PathEscape,
}

async fn wait_for_artifacts(config: &JobWatcherConfig, job: &Job) -> ArtifactWait {
    for path in &job.watch.require_files {
        if !relay_storage::paths::is_under_allowed_root(path, &config.workdir_allow_roots) {
            return ArtifactWait::PathEscape;
        }
    }
    let deadline = tokio::time::Instant::now() + Duration::from_secs(job.watch.ready_timeout_sec);
    let poll = Duration::from_secs(job.watch.ready_poll_sec.max(1));
    loop {
        if job.watch.require_files.iter().all(|p| p.exists()) {
            return ArtifactWait::Ready;
        }
        if tokio::time::Instant::now() >= deadline {
            return ArtifactWait::TimedOut;
        }
        tokio::time::sleep(poll).await;
    }
}

async fn validate_supervisor_gate(gate: &SupervisorGate) -> Result<(), String> {
    let text = tokio::fs::read_to_string(&gate.supervisor_state_file)
        .await
        .map_err(|err| format!("supervisor state file unreadable: {err}"))?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|err| format!("supervisor state file is not valid json: {err}"))?;
    let status = value.get("status").and_then(|v| v.as_str()).unwrap_or_default();
    if status != gate.supervisor_expect_status {
        return Err(format!("supervisor status `{status}` != expected `{}`", gate.supervisor_expect_status));
    }
    if gate.supervisor_cleanup_smoke_policy == CleanupSmokePolicy::KeepManifestOnly {
        let action = value.pointer("/smoke_cleanup/action").and_then(|v| v.as_str()).unwrap_or_default();
        if action != "deleted_smoke_run_dir_kept_manifest" {
            return Err("smoke_cleanup.action does not match keep_manifest_only policy".to_string());
        }
    }
    Ok(())
}

async fn finalize(config: &JobWatcherConfig, transport: &dyn ChatTransport, channel_id: &str, job: &mut Job, now_ms: u64, outcome: &mut TickOutcome) {
    if job.watch.has_artifact_gate() && (config.require_files_feature_enabled || job.watch.supervisor_gate.is_some()) {
        match wait_for_artifacts(config, job).await {
            ArtifactWait::Ready => {
                if let Some(gate) = job.watch.supervisor_gate.clone() {
                    if let Err(reason) = validate_supervisor_gate(&gate).await {
                        job.mark_blocked(reason, now_ms);
                        post_closing(transport, channel_id, job).await;
                        maybe_research_hook(job, now_ms, outcome).await;
                        return;
                    }
                }
            }
            ArtifactWait::TimedOut => {
                if job.watch.on_missing == OnMissing::Block {
                    job.mark_blocked("required artifacts missing after timeout", now_ms);
                    post_closing(transport, channel_id, job).await;
                    maybe_research_hook(job, now_ms, outcome).await;
                    return;
                }
            }
            ArtifactWait::PathEscape => {
                job.mark_blocked("required artifact path escaped the allowed roots", now_ms);
                post_closing(transport, channel_id, job).await;
                maybe_research_hook(job, now_ms, outcome).await;
                return;
            }
        }
    }

    post_closing(transport, channel_id, job).await;
    maybe_research_hook(job, now_ms, outcome).await;

    if let Some(then_task) = job.watch.then_task.clone() {
        outcome.then_task_prompt = Some(then_task);
        outcome.then_task_source_job = Some(job.id.clone());
        outcome.start_task_runner = job.watch.run_tasks;
    }
}

async fn maybe_research_hook(job: &Job, now_ms: u64, outcome: &mut TickOutcome) {
    let Some(research) = job.research.clone() else { return };
    let metrics_valid = append_research_registry_row(&research, &job.id, now_ms).await;
    outcome.research_post_job = Some(ResearchPostJob { project_root: research.project_root, metrics_valid });
}

async fn append_research_registry_row(meta: &ResearchJobMeta, job_id: &str, now_ms: u64) -> bool {
    let registry_path = meta.project_root.join("exp").join("registry.jsonl");
    let (row, metrics_valid) = match tokio::fs::read_to_string(&meta.metrics_path).await {
        Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(metrics) => (serde_json::json!({"run_id": meta.run_id, "job_id": job_id, "at_ms": now_ms, "status": "ok", "metrics": metrics}), true),
            Err(_) => (serde_json::json!({"run_id": meta.run_id, "job_id": job_id, "at_ms": now_ms, "status": "invalid"}), false),
        },
        Err(_) => (serde_json::json!({"run_id": meta.run_id, "job_id": job_id, "at_ms": now_ms, "status": "invalid"}), false),
    };

    if let Some(parent) = registry_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    if let Ok(mut file) = tokio::fs::OpenOptions::new().create(true).append(true).open(&registry_path).await {
        let _ = file.write_all(format!("{row}\n").as_bytes()).await;
    }
    metrics_valid
}

async fn post_closing(transport: &dyn ChatTransport, channel_id: &str, job: &Job) {
    let status = format!("{:?}", job.status).to_lowercase();
    post(transport, channel_id, format!("job {} finished: {status}", job.id)).await;
}

async fn post_tail_update(config: &JobWatcherConfig, transport: &dyn ChatTransport, channel_id: &str, job: &Job, tail: &[u8], task_summary: Option<&str>, now_ms: u64) {
    let text = String::from_utf8_lossy(tail);
    let new_lines = text.lines().count();
    let new_chars = text.chars().count();
    let elapsed = format_elapsed_ms(now_ms.saturating_sub(job.started_at_ms));
    let body = if config.compact_mode {
        let counts = task_summary.map(|s| format!(" | {s}")).unwrap_or_default();
        format!("job {} | elapsed {elapsed}{counts} | new output: {new_lines} lines, {new_chars} chars", job.id)
    } else {
        format!("job {} full tail:\n{text}", job.id)
    };
    post(transport, channel_id, body).await;
}

async fn post(transport: &dyn ChatTransport, channel_id: &str, text: String) {
    let _ = transport.send_message(OutboundMessage { channel_id: channel_id.to_string(), text }).await;
}

/// Reads up to `cap` trailing bytes of `path`, or an empty vec if unreadable.
async fn tail_bytes(path: &std::path::Path, cap: usize) -> Vec<u8> {
    let Ok(bytes) = tokio::fs::read(path).await else { return Vec::new() };
    if bytes.len() <= cap {
        bytes
    } else {
        bytes[bytes.len() - cap..].to_vec()
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

async fn cpu_pct_for_tree(root_pid: u32) -> f32 {
    let mut pids = signals::process_tree(root_pid as i32);
    pids.push(root_pid as i32);
    let pid_list = pids.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",");
    let Ok(output) = tokio::process::Command::new("ps").args(["-o", "%cpu=", "-p", &pid_list]).output().await else { return 0.0 };
    String::from_utf8_lossy(&output.stdout).lines().filter_map(|l| l.trim().parse::<f32>().ok()).sum()
}

async fn gpu_util_pct() -> Option<f32> {
    let output = tokio::process::Command::new("nvidia-smi")
        .args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|l| l.trim().parse::<f32>().ok())
        .fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.max(v))))
}

#[cfg(test)]
#[path = "job_watcher_tests.rs"]
mod tests;
