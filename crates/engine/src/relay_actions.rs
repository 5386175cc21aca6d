// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component K: the relay-action protocol. Parses `[[relay-actions]]{json}`
//! blocks into a strictly validated action list, applies launch guards to
//! `job_start`, then executes every action against a [`Session`].

use crate::job_supervisor::{self, StartJobRequest};
use crate::EngineError;
use regex::Regex;
use relay_core::config::GuardMode;
use relay_core::job::{Job, OnMissing, SupervisorGate, WatchConfig};
use relay_core::markers::Marker;
use relay_core::session::Session;
use relay_core::task::Task;
use relay_storage::paths::{is_under_allowed_root, Layout};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Bound on how many actions a single reply's relay-action blocks may carry
/// once parsed and flattened; anything beyond this is dropped, not queued.
pub const DEFAULT_MAX_PER_MESSAGE: usize = 4;

#[derive(Debug, Clone)]
pub struct RelayActionsConfig {
    pub enabled: bool,
    pub dm_only: bool,
    pub max_per_message: usize,
    pub wait_pattern_guard_mode: GuardMode,
    pub workdir_allow_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct PreflightSpec {
    #[serde(default)]
    path_exists: Vec<String>,
    #[serde(default)]
    cmd_exit_zero: Vec<String>,
    min_free_disk_gb: Option<f64>,
    #[serde(default = "default_on_fail")]
    on_fail: String,
}

fn default_on_fail() -> String {
    "reject".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct WatchPatch {
    every_sec: Option<u64>,
    tail_lines: Option<usize>,
    require_files: Option<Vec<String>>,
    ready_timeout_sec: Option<u64>,
    ready_poll_sec: Option<u64>,
    on_missing: Option<String>,
    long: Option<bool>,
    first_post_regex: Option<String>,
}

impl WatchPatch {
    fn apply(&self, mut watch: WatchConfig) -> WatchConfig {
        if let Some(v) = self.every_sec {
            watch.every_sec = v;
        }
        if let Some(v) = self.tail_lines {
            watch.tail_lines = v;
        }
        if let Some(v) = &self.require_files {
            watch.require_files = v.iter().map(PathBuf::from).collect();
        }
        if let Some(v) = self.ready_timeout_sec {
            watch.ready_timeout_sec = v;
        }
        if let Some(v) = self.ready_poll_sec {
            watch.ready_poll_sec = v;
        }
        if let Some(v) = &self.on_missing {
            watch.on_missing = if v.eq_ignore_ascii_case("enqueue") { OnMissing::Enqueue } else { OnMissing::Block };
        }
        if let Some(v) = self.long {
            watch.long = v;
        }
        if let Some(v) = &self.first_post_regex {
            watch.first_post_regex = Some(v.clone());
        }
        watch
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct SupervisorSpec {
    script: String,
    state_file: String,
    expect_status: String,
    #[serde(default)]
    cleanup_smoke_policy: Option<String>,
    #[serde(default)]
    extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct JobStartAction {
    command: Option<String>,
    supervisor: Option<SupervisorSpec>,
    description: Option<String>,
    workdir: Option<String>,
    #[serde(default)]
    watch: WatchPatch,
    preflight: Option<PreflightSpec>,
    then_task: Option<String>,
    then_task_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct JobWatchAction {
    job_id: Option<String>,
    #[serde(default)]
    watch: WatchPatch,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct JobStopAction {
    job_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub(crate) struct TaskAddAction {
    description: String,
    prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TaskRunAction {}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum RawAction {
    JobStart(JobStartAction),
    JobWatch(JobWatchAction),
    JobStop(JobStopAction),
    TaskAdd(TaskAddAction),
    TaskRun(TaskRunAction),
}

#[derive(Debug, Clone)]
pub enum ValidatedAction {
    JobStart(JobStartAction),
    JobWatch(JobWatchAction),
    JobStop(JobStopAction),
    TaskAdd { description: String, prompt: String },
    TaskRun,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedActions {
    pub actions: Vec<ValidatedAction>,
    pub errors: Vec<String>,
}

/// Parses every `[[relay-actions]]` block found among `markers` into a flat,
/// strictly validated action list. A block that fails to parse as the
/// `{"actions": [...]}` shape, or whose action has an unrecognized `type` or
/// a key outside that type's allowed set, contributes a parse error instead
/// of an action — it never aborts the rest of the reply.
pub fn parse(markers: &[Marker]) -> ParsedActions {
    let mut result = ParsedActions::default();
    for marker in markers {
        let Marker::RelayActions { json } = marker else { continue };
        match parse_block(json) {
            Ok(actions) => result.actions.extend(actions),
            Err(err) => result.errors.push(err),
        }
    }
    result
}

fn parse_block(json: &str) -> Result<Vec<ValidatedAction>, String> {
    let top: serde_json::Value = serde_json::from_str(json).map_err(|err| format!("invalid relay-actions json: {err}"))?;
    let raw_actions = top.get("actions").and_then(|v| v.as_array()).ok_or_else(|| "relay-actions payload missing an \"actions\" array".to_string())?;

    let mut out = Vec::with_capacity(raw_actions.len());
    for (index, raw) in raw_actions.iter().enumerate() {
        let mut normalized = raw.clone();
        if let Some(obj) = normalized.as_object_mut() {
            if let Some(serde_json::Value::String(t)) = obj.get("type").cloned() {
                obj.insert("type".to_string(), serde_json::Value::String(t.to_lowercase()));
            }
        }
        let parsed: RawAction = serde_json::from_value(normalized).map_err(|err| format!("action[{index}]: {err}"))?;
        out.push(validate(parsed).map_err(|err| format!("action[{index}]: {err}"))?);
    }
    Ok(out)
}

fn validate(raw: RawAction) -> Result<ValidatedAction, String> {
    match raw {
        RawAction::JobStart(action) => {
            match (&action.command, &action.supervisor) {
                (Some(_), None) | (None, Some(_)) => {}
                (Some(_), Some(_)) => return Err("job_start: exactly one of `command`/`supervisor` is allowed, not both".to_string()),
                (None, None) => return Err("job_start: one of `command`/`supervisor` is required".to_string()),
            }
            Ok(ValidatedAction::JobStart(action))
        }
        RawAction::JobWatch(action) => Ok(ValidatedAction::JobWatch(action)),
        RawAction::JobStop(action) => Ok(ValidatedAction::JobStop(action)),
        RawAction::TaskAdd(action) => Ok(ValidatedAction::TaskAdd { description: action.description, prompt: action.prompt }),
        RawAction::TaskRun(_) => Ok(ValidatedAction::TaskRun),
    }
}

/// Result of dispatching a fully validated action list against a session.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub jobs_started: Vec<String>,
    pub jobs_stopped: Vec<String>,
    pub jobs_watched: Vec<String>,
    pub tasks_added: Vec<String>,
    pub start_task_runner: bool,
    pub rejected: Vec<String>,
}

/// Finds `pgrep -f <pattern>` inside `command` and reports the pattern if
/// the command text itself matches it — the self-match risk the wait-guard
/// exists to catch.
#[allow(clippy::expect_used)]
fn unsafe_wait_pattern(command: &str) -> Option<String> {
    static RE_CELL: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE_CELL.get_or_init(|| Regex::new(r#"pgrep\s+-f\s+['"]?([^'"\n]+)['"]?"#).expect("constant regex pattern is valid"));
    let caps = re.captures(command)?;
    let pattern = caps.get(1)?.as_str().trim();
    let compiled = Regex::new(pattern).ok()?;
    if compiled.is_match(command) {
        Some(pattern.to_string())
    } else {
        None
    }
}

async fn run_preflight(preflight: &PreflightSpec, allow_roots: &[PathBuf]) -> Result<(), String> {
    for path in &preflight.path_exists {
        let path = PathBuf::from(path);
        if !is_under_allowed_root(&path, allow_roots) {
            return Err(format!("preflight path_exists `{}` escapes the allowed roots", path.display()));
        }
        if !path.exists() {
            return Err(format!("preflight path_exists failed: `{}` does not exist", path.display()));
        }
    }
    for cmd in &preflight.cmd_exit_zero {
        let status = tokio::process::Command::new("bash").arg("-lc").arg(cmd).status().await.map_err(|err| format!("preflight cmd_exit_zero `{cmd}` failed to spawn: {err}"))?;
        if !status.success() {
            return Err(format!("preflight cmd_exit_zero `{cmd}` exited {status}"));
        }
    }
    if let Some(min_gb) = preflight.min_free_disk_gb {
        let free_gb = free_disk_gb(Path::new(".")).await.ok_or_else(|| "preflight min_free_disk_gb: could not read free disk space".to_string())?;
        if free_gb < min_gb {
            return Err(format!("preflight min_free_disk_gb failed: {free_gb:.2}GB free, need {min_gb:.2}GB"));
        }
    }
    Ok(())
}

async fn free_disk_gb(path: &Path) -> Option<f64> {
    let output = tokio::process::Command::new("df").arg("-Pk").arg(path).output().await.ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().nth(1)?;
    let free_kb: f64 = line.split_whitespace().nth(3)?.parse().ok()?;
    Some(free_kb / (1024.0 * 1024.0))
}

fn job_id(now_ms: u64) -> String {
    let dt = chrono::DateTime::from_timestamp_millis(now_ms as i64).unwrap_or_default();
    let date_stamp = dt.format("%Y%m%d").to_string();
    let time_stamp = dt.format("%H%M%S").to_string();
    let rand_suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_string();
    Job::format_id(&date_stamp, &time_stamp, &rand_suffix)
}

fn sanitize_conv_key(conversation_key: &str) -> String {
    conversation_key.replace([':', '/'], "_")
}

fn build_supervisor_command(spec: &SupervisorSpec, run_id: &str) -> (String, SupervisorGate) {
    let mut argv = vec!["python3".to_string(), spec.script.clone(), "--run-id".to_string(), run_id.to_string(), "--state-file".to_string(), spec.state_file.clone()];
    argv.extend(spec.extra_args.clone());
    let command = argv.iter().map(|a| shell_words_quote(a)).collect::<Vec<_>>().join(" ");
    let policy = match spec.cleanup_smoke_policy.as_deref() {
        Some("keep_manifest_only") => relay_core::job::CleanupSmokePolicy::KeepManifestOnly,
        _ => relay_core::job::CleanupSmokePolicy::KeepAll,
    };
    let gate = SupervisorGate {
        supervisor_mode: "smoke".to_string(),
        supervisor_state_file: PathBuf::from(&spec.state_file),
        supervisor_expect_status: spec.expect_status.clone(),
        supervisor_cleanup_smoke_policy: policy,
    };
    (command, gate)
}

fn shell_words_quote(arg: &str) -> String {
    if arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Gates `actions` per policy (enabled, dm-only, per-message cap) and then
/// executes every surviving action against `session`, starting/stopping
/// jobs through [`job_supervisor`] and mutating the task queue directly.
pub async fn dispatch(session: &mut Session, layout: &Layout, actions: Vec<ValidatedAction>, config: &RelayActionsConfig, is_dm: bool, now_ms: u64) -> Result<DispatchReport, EngineError> {
    let mut report = DispatchReport::default();

    if !config.enabled {
        report.rejected.push("relay actions are disabled".to_string());
        return Ok(report);
    }
    if config.dm_only && !is_dm {
        report.rejected.push("relay actions are restricted to direct messages".to_string());
        return Ok(report);
    }
    if !session.auto.actions {
        report.rejected.push("relay actions are off for this conversation".to_string());
        return Ok(report);
    }

    let max = config.max_per_message.max(1);
    let (accepted, dropped) = if actions.len() > max { (&actions[..max], actions.len() - max) } else { (&actions[..], 0) };
    if dropped > 0 {
        warn!(dropped, "dropping relay actions beyond the per-message budget");
        report.rejected.push(format!("dropped {dropped} action(s) beyond the {max}-per-message budget"));
    }

    for action in accepted.iter().cloned() {
        match action {
            ValidatedAction::JobStart(start) => {
                if let Err(reason) = apply_job_start(session, layout, &start, config, now_ms).await {
                    report.rejected.push(reason);
                } else if let Some(job) = session.jobs.last() {
                    report.jobs_started.push(job.id.clone());
                }
            }
            ValidatedAction::JobWatch(watch_action) => match apply_job_watch(session, &watch_action) {
                Ok(job_id) => report.jobs_watched.push(job_id),
                Err(reason) => report.rejected.push(reason),
            },
            ValidatedAction::JobStop(stop_action) => match apply_job_stop(session, &stop_action) {
                Ok(job_id) => report.jobs_stopped.push(job_id),
                Err(reason) => report.rejected.push(reason),
            },
            ValidatedAction::TaskAdd { description, prompt } => match apply_task_add(session, description, prompt, now_ms) {
                Ok(id) => report.tasks_added.push(id),
                Err(reason) => report.rejected.push(reason),
            },
            ValidatedAction::TaskRun => match apply_task_run(session) {
                Ok(()) => report.start_task_runner = true,
                Err(reason) => report.rejected.push(reason),
            },
        }
    }

    Ok(report)
}

/// Placeholder cap kept local to this module until `task_add`'s refusal
/// threshold is wired to `Config::task_queue_max_pending` by the daemon.
fn config_task_queue_cap() -> usize {
    50
}

/// Appends a task to the queue, refusing once the pending count reaches
/// the cap. Shared by normal-action dispatch and the research manager's
/// stricter allowlist.
pub(crate) fn apply_task_add(session: &mut Session, description: String, prompt: String, now_ms: u64) -> Result<String, String> {
    if session.tasks.iter().filter(|t| matches!(t.status, relay_core::task::TaskStatus::Pending)).count() >= config_task_queue_cap() {
        return Err("task_add refused: task queue is full".to_string());
    }
    let id = session.allocate_task_id();
    session.tasks.push(Task::new(id.clone(), description, prompt, now_ms));
    Ok(id)
}

/// Signals the task runner should start, refusing if it is already
/// running. Shared by normal-action dispatch and the research manager.
pub(crate) fn apply_task_run(session: &Session) -> Result<(), String> {
    if session.task_loop.running {
        Err("task_run ignored: the task loop is already running".to_string())
    } else {
        Ok(())
    }
}

async fn apply_job_start(session: &mut Session, layout: &Layout, action: &JobStartAction, config: &RelayActionsConfig, now_ms: u64) -> Result<(), String> {
    let id = job_id(now_ms);

    // `validate()` rejects any `job_start` where `command`/`supervisor` aren't
    // exactly one-present; a `ValidatedAction::JobStart` never reaches here
    // with both absent.
    #[allow(clippy::expect_used)]
    let (command, supervisor_gate) = if let Some(supervisor) = &action.supervisor {
        let (command, gate) = build_supervisor_command(supervisor, &id);
        (command, Some(gate))
    } else {
        (action.command.clone().expect("validated: command present when supervisor absent"), None)
    };

    if let Some(pattern) = unsafe_wait_pattern(&command) {
        match config.wait_pattern_guard_mode {
            GuardMode::Reject => return Err(format!("job_start rejected: command self-matches its own pgrep pattern `{pattern}`")),
            GuardMode::Warn => warn!(pattern, "job_start command self-matches its own pgrep pattern"),
            GuardMode::Off => {}
        }
    }

    if let Some(preflight) = &action.preflight {
        if let Err(reason) = run_preflight(preflight, &config.workdir_allow_roots).await {
            if preflight.on_fail == "warn" {
                warn!(reason, "job_start preflight check failed, proceeding per onFail=warn");
            } else {
                return Err(format!("job_start rejected: {reason}"));
            }
        }
    }

    let mut watch = action.watch.apply(WatchConfig::minimal(10, 20));
    if let Some(gate) = supervisor_gate {
        watch.require_files.push(gate.supervisor_state_file.clone());
        watch.supervisor_gate = Some(gate);
    }
    if let Some(then_task) = &action.then_task {
        watch.then_task = Some(then_task.clone());
        watch.then_task_description = action.then_task_description.clone();
    }

    let workdir = action.workdir.as_ref().map(PathBuf::from).unwrap_or_else(|| session.workdir.clone());
    let request = StartJobRequest {
        conversation_key: session.conversation_key.clone(),
        sanitized_conv_key: sanitize_conv_key(&session.conversation_key),
        job_id: id,
        command,
        description: action.description.clone(),
        workdir,
        watch,
    };

    let job = job_supervisor::start_job(layout, request, now_ms).await.map_err(|err| format!("job_start failed: {err}"))?;
    session.jobs.push(job);
    Ok(())
}

fn target_job<'a>(session: &'a mut Session, job_id: Option<&str>) -> Option<&'a mut Job> {
    if let Some(job_id) = job_id {
        return session.find_job_mut(job_id);
    }
    session.running_job_mut().or_else(|| session.jobs.last_mut())
}

pub(crate) fn apply_job_watch(session: &mut Session, action: &JobWatchAction) -> Result<String, String> {
    let job_id_ref = action.job_id.as_deref();
    let Some(job) = target_job(session, job_id_ref) else {
        return Err("job_watch: no matching job".to_string());
    };
    job.watch = action.watch.clone().apply(job.watch.clone());
    Ok(job.id.clone())
}

pub(crate) fn apply_job_stop(session: &mut Session, action: &JobStopAction) -> Result<String, String> {
    let job_id_ref = action.job_id.as_deref();
    let Some(job) = target_job(session, job_id_ref) else {
        return Err("job_stop: no matching job".to_string());
    };
    let id = job.id.clone();
    job_supervisor::stop_job(job).map_err(|err| format!("job_stop failed: {err}"))?;
    Ok(id)
}

/// Narrow variant of [`apply_job_watch`] for the research manager's
/// decision actions, which only ever patch `everySec`.
pub(crate) fn research_job_watch(session: &mut Session, job_id: Option<&str>, every_sec: Option<u64>) -> Result<String, String> {
    let Some(job) = target_job(session, job_id) else {
        return Err("job_watch: no matching job".to_string());
    };
    if let Some(v) = every_sec {
        job.watch.every_sec = v;
    }
    Ok(job.id.clone())
}

/// Narrow variant of [`apply_job_stop`] for the research manager's decision
/// actions.
pub(crate) fn research_job_stop(session: &mut Session, job_id: Option<&str>) -> Result<String, String> {
    let Some(job) = target_job(session, job_id) else {
        return Err("job_stop: no matching job".to_string());
    };
    let id = job.id.clone();
    job_supervisor::stop_job(job).map_err(|err| format!("job_stop failed: {err}"))?;
    Ok(id)
}

#[cfg(test)]
#[path = "relay_actions_tests.rs"]
mod tests;
