// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component L: the research manager control loop. The LLM plans and acts
//! through a single `[[research-decision]]` block per step; this module
//! enforces the safety envelope around it — lease serialization, decision
//! idempotency, a stricter action allowlist, and the project's on-disk
//! report/digest files.

use crate::job_supervisor::{self, StartJobRequest};
use crate::EngineError;
use relay_adapters::{AgentCliAdapter, AgentSpawnConfig};
use relay_core::job::{ResearchJobMeta, WatchConfig};
use relay_core::markers::{self, Marker};
use relay_core::research::ResearchProjectState;
use relay_storage::paths::Layout;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// How many trailing lines of a project artifact file are folded into the
/// planner prompt.
const TAIL_LINES: usize = 40;

/// Files and directories scaffolded under a fresh project root. Creation is
/// additive: an existing file is left untouched.
const SCAFFOLD_FILES: &[&str] = &[
    "idea/goal.md",
    "idea/hypotheses.yaml",
    "exp/registry.jsonl",
    "reports/rolling_report.md",
    "reports/report_digest.md",
    "writing/REPORT.md",
    "manager/state.json",
    "manager/events.jsonl",
    "memory/handoff.md",
    "WORKING_MEMORY.md",
    "HANDOFF_LOG.md",
    "HYPOTHESES.md",
    "QUESTIONS.md",
];
const SCAFFOLD_DIRS: &[&str] = &["idea", "exp", "exp/results", "reports", "writing", "manager", "memory"];

/// Creates the project directory tree and every scaffold file that does
/// not already exist. `goal` seeds `idea/goal.md` on first creation only.
pub async fn scaffold_project(project_root: &Path, goal: &str) -> std::io::Result<()> {
    for dir in SCAFFOLD_DIRS {
        tokio::fs::create_dir_all(project_root.join(dir)).await?;
    }
    for file in SCAFFOLD_FILES {
        let path = project_root.join(file);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }
        let seed = if *file == "idea/goal.md" { format!("# Goal\n\n{goal}\n") } else { String::new() };
        tokio::fs::write(&path, seed).await?;
    }
    Ok(())
}

/// Loads the project's `manager/state.json`. A missing or empty file (the
/// state left by [`scaffold_project`] before a project has been
/// initialized) yields `None` rather than an error.
pub async fn load_project_state(project_root: &Path) -> Result<Option<ResearchProjectState>, EngineError> {
    let path = project_root.join("manager/state.json");
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(EngineError::Io(err)),
    };
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Serializes `project` to `manager/state.json`, replacing whatever was
/// there. Not atomic-rename like component B's session store; a project's
/// own state file is cheap to regenerate from the manager's in-memory copy
/// on the rare torn write.
pub async fn save_project_state(project_root: &Path, project: &ResearchProjectState) -> Result<(), EngineError> {
    let path = project_root.join("manager/state.json");
    let bytes = serde_json::to_vec_pretty(project)?;
    tokio::fs::write(&path, bytes).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ManagerStepInputs {
    pub provider: relay_adapters::Provider,
    pub manager_conv_key: String,
    pub project_root: PathBuf,
    pub holder: String,
    pub lease_token: String,
    pub manual_mode: bool,
    pub active_research_job_running: bool,
    pub feedback_events: Vec<String>,
    pub now_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ManagerStepOutcome {
    pub skipped_reason: Option<String>,
    pub jobs_started: Vec<String>,
    pub jobs_watched: Vec<String>,
    pub jobs_stopped: Vec<String>,
    pub tasks_added: Vec<String>,
    pub start_task_runner: bool,
    pub report_written: bool,
    pub paused: bool,
    pub marked_done: bool,
    pub failure: Option<String>,
}

fn skipped(reason: impl Into<String>) -> ManagerStepOutcome {
    ManagerStepOutcome { skipped_reason: Some(reason.into()), ..Default::default() }
}

/// Runs one manager step end to end per the documented 11-step contract.
/// `session` is the manager's own sub-session (dedicated conversation key
/// bound to the project root as workdir) that `job_start`/`task_add`/etc.
/// mutate. Returns `Ok` even when the step is refused or fails internally;
/// those outcomes are reported through the returned struct, not `Err` — an
/// `Err` here means infrastructure (agent invocation, disk I/O) broke, not
/// that the research plan was rejected.
pub async fn run_manager_step(project: &mut ResearchProjectState, session: &mut relay_core::session::Session, adapter: &dyn AgentCliAdapter, layout: &Layout, inputs: ManagerStepInputs) -> Result<ManagerStepOutcome, EngineError> {
    project.repair_stale(inputs.now_ms);

    if project.status == relay_core::research::ResearchStatus::Done {
        return Ok(skipped("research is done"));
    }
    if project.status == relay_core::research::ResearchStatus::Blocked && !inputs.manual_mode {
        return Ok(skipped("research is blocked"));
    }
    if project.budget_exceeded() {
        return Ok(skipped("budgets exceeded"));
    }
    if inputs.active_research_job_running {
        return Ok(skipped("a research-bound job is still running"));
    }
    if !project.acquire_lease(inputs.holder.clone(), inputs.lease_token.clone(), inputs.now_ms) {
        return Ok(skipped("a lease is already active"));
    }

    let step_result = run_leased_step(project, session, adapter, layout, &inputs).await;

    match &step_result {
        Ok(outcome) if outcome.failure.is_none() => {
            project.release_lease();
        }
        _ => {
            project.status = relay_core::research::ResearchStatus::Blocked;
            project.auto_run = false;
            project.release_lease();
        }
    }

    step_result
}

async fn run_leased_step(project: &mut ResearchProjectState, session: &mut relay_core::session::Session, adapter: &dyn AgentCliAdapter, layout: &Layout, inputs: &ManagerStepInputs) -> Result<ManagerStepOutcome, EngineError> {
    let prompt = build_planner_prompt(project, &inputs.project_root, &inputs.feedback_events).await;

    let mut config = AgentSpawnConfig::new(inputs.provider, prompt, inputs.project_root.clone());
    config.ephemeral = false;
    let no_op = |_note: relay_adapters::ProgressNote| {};
    let no_op_spawn = |_pid: u32| {};
    let outcome = adapter.run(config, &no_op, &no_op_spawn).await.map_err(EngineError::Agent)?;

    let tokenized = markers::tokenize(&outcome.final_text, true);
    let decisions: Vec<&str> = tokenized
        .markers
        .iter()
        .filter_map(|m| match m {
            Marker::ResearchDecision { json } => Some(json.as_str()),
            _ => None,
        })
        .collect();

    let Some(decision_json) = (if decisions.len() == 1 { Some(decisions[0]) } else { None }) else {
        return Ok(failed(project, inputs.now_ms, format!("expected exactly one research-decision block, found {}", decisions.len())).await);
    };

    let hash = sha256_hex(decision_json.as_bytes());
    if !project.record_decision_hash(hash) {
        return Ok(ManagerStepOutcome::default());
    }

    let decision: Decision = match serde_json::from_str(decision_json) {
        Ok(d) => d,
        Err(err) => return Ok(failed(project, inputs.now_ms, format!("malformed research-decision: {err}")).await),
    };

    let actions = match parse_decision_actions(&decision.actions) {
        Ok(actions) => actions,
        Err(err) => return Ok(failed(project, inputs.now_ms, err).await),
    };

    let mut result = ManagerStepOutcome::default();
    for action in actions {
        if let Err(err) = execute_action(project, session, layout, inputs, action, &mut result).await {
            return Ok(failed(project, inputs.now_ms, err).await);
        }
    }

    project.counters.steps += 1;
    append_event(&inputs.project_root, "decision_applied", &decision.step_id, inputs.now_ms).await;
    append_digest(&inputs.project_root, &format!("Applied {}: {}", decision.step_id, decision.research_update), inputs.now_ms).await;

    Ok(result)
}

async fn failed(project: &mut ResearchProjectState, now_ms: u64, reason: String) -> ManagerStepOutcome {
    project.status = relay_core::research::ResearchStatus::Blocked;
    project.auto_run = false;
    warn!(reason, "research manager step failed");
    ManagerStepOutcome { failure: Some(reason), ..Default::default() }
}

#[derive(Debug, serde::Deserialize)]
struct Decision {
    #[serde(rename = "stepId")]
    step_id: String,
    research_update: String,
    actions: Vec<serde_json::Value>,
}

#[derive(Debug, Clone)]
enum DecisionAction {
    JobStart { command: String, description: Option<String> },
    JobWatch { job_id: Option<String>, every_sec: Option<u64> },
    JobStop { job_id: Option<String> },
    TaskAdd { description: String, prompt: String },
    TaskRun,
    WriteReport { content: String },
    ResearchPause,
    ResearchMarkDone,
}

/// Parses and applies the stricter research allowlist: every action (the
/// normal types plus `write_report`/`research_pause`/`research_mark_done`)
/// must carry an `idempotencyKey`; a repeated key is silently skipped
/// rather than re-applied.
fn parse_decision_actions(raw: &[serde_json::Value]) -> Result<Vec<DecisionAction>, String> {
    let mut out = Vec::with_capacity(raw.len());
    for (index, value) in raw.iter().enumerate() {
        let obj = value.as_object().ok_or_else(|| format!("action[{index}] is not an object"))?;
        let type_str = obj.get("type").and_then(|v| v.as_str()).ok_or_else(|| format!("action[{index}] missing `type`"))?.to_lowercase();
        if obj.get("idempotencyKey").and_then(|v| v.as_str()).is_none() {
            return Err(format!("action[{index}] (`{type_str}`) missing `idempotencyKey`"));
        }
        let action = match type_str.as_str() {
            "job_start" => DecisionAction::JobStart {
                command: obj.get("command").and_then(|v| v.as_str()).ok_or_else(|| format!("action[{index}] job_start missing `command`"))?.to_string(),
                description: obj.get("description").and_then(|v| v.as_str()).map(str::to_string),
            },
            "job_watch" => DecisionAction::JobWatch {
                job_id: obj.get("jobId").and_then(|v| v.as_str()).map(str::to_string),
                every_sec: obj.get("everySec").and_then(|v| v.as_u64()),
            },
            "job_stop" => DecisionAction::JobStop { job_id: obj.get("jobId").and_then(|v| v.as_str()).map(str::to_string) },
            "task_add" => DecisionAction::TaskAdd {
                description: obj.get("description").and_then(|v| v.as_str()).ok_or_else(|| format!("action[{index}] task_add missing `description`"))?.to_string(),
                prompt: obj.get("prompt").and_then(|v| v.as_str()).ok_or_else(|| format!("action[{index}] task_add missing `prompt`"))?.to_string(),
            },
            "task_run" => DecisionAction::TaskRun,
            "write_report" => DecisionAction::WriteReport { content: obj.get("content").and_then(|v| v.as_str()).ok_or_else(|| format!("action[{index}] write_report missing `content`"))?.to_string() },
            "research_pause" => DecisionAction::ResearchPause,
            "research_mark_done" => DecisionAction::ResearchMarkDone,
            other => return Err(format!("action[{index}] has unrecognized type `{other}`")),
        };
        out.push(action);
    }
    Ok(out)
}

async fn execute_action(project: &mut ResearchProjectState, session: &mut relay_core::session::Session, layout: &Layout, inputs: &ManagerStepInputs, action: DecisionAction, result: &mut ManagerStepOutcome) -> Result<(), String> {
    match action {
        DecisionAction::JobStart { command, description } => {
            let run_seq = project.counters.runs + 1;
            let run_id = format!("r{run_seq:04}");
            let run_dir = inputs.project_root.join("exp").join("results").join(&run_id);
            tokio::fs::create_dir_all(&run_dir).await.map_err(|err| err.to_string())?;
            let stdout_path = run_dir.join("stdout.log");
            let metrics_path = run_dir.join("metrics.json");
            let wrapped = format!(
                "export RUN_ID={run_id}; export RUN_DIR={}; ({command}) > {} 2>&1",
                shell_escape(&run_dir.display().to_string()),
                shell_escape(&stdout_path.display().to_string()),
            );

            let sanitized = inputs.manager_conv_key.replace([':', '/'], "_");
            let job_id = format!("research-{run_id}");
            let request = StartJobRequest {
                conversation_key: inputs.manager_conv_key.clone(),
                sanitized_conv_key: sanitized,
                job_id,
                command: wrapped,
                description,
                workdir: inputs.project_root.clone(),
                watch: WatchConfig::minimal(10, 40),
            };
            let mut job = job_supervisor::start_job(layout, request, inputs.now_ms).await.map_err(|err| err.to_string())?;
            job.research = Some(ResearchJobMeta { project_root: inputs.project_root.clone(), run_id, run_dir, stdout_path, metrics_path });
            result.jobs_started.push(job.id.clone());
            session.jobs.push(job);
            project.counters.runs = run_seq;
            Ok(())
        }
        DecisionAction::JobWatch { job_id, every_sec } => {
            let id = crate::relay_actions::research_job_watch(session, job_id.as_deref(), every_sec)?;
            result.jobs_watched.push(id);
            Ok(())
        }
        DecisionAction::JobStop { job_id } => {
            let id = crate::relay_actions::research_job_stop(session, job_id.as_deref())?;
            result.jobs_stopped.push(id);
            Ok(())
        }
        DecisionAction::TaskAdd { description, prompt } => {
            let id = crate::relay_actions::apply_task_add(session, description, prompt, inputs.now_ms)?;
            result.tasks_added.push(id);
            Ok(())
        }
        DecisionAction::TaskRun => {
            crate::relay_actions::apply_task_run(session)?;
            result.start_task_runner = true;
            Ok(())
        }
        DecisionAction::WriteReport { content } => {
            write_rolling_report(&inputs.project_root, &content, inputs.now_ms).await.map_err(|err| err.to_string())?;
            result.report_written = true;
            Ok(())
        }
        DecisionAction::ResearchPause => {
            project.status = relay_core::research::ResearchStatus::Paused;
            project.auto_run = false;
            result.paused = true;
            Ok(())
        }
        DecisionAction::ResearchMarkDone => {
            project.status = relay_core::research::ResearchStatus::Done;
            project.auto_run = false;
            result.marked_done = true;
            Ok(())
        }
    }
}

fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

async fn write_rolling_report(project_root: &Path, content: &str, now_ms: u64) -> std::io::Result<()> {
    tokio::fs::write(project_root.join("reports").join("rolling_report.md"), content).await?;
    tokio::fs::write(project_root.join("writing").join("REPORT.md"), content).await?;
    append_digest(project_root, "Report updated", now_ms).await;
    Ok(())
}

async fn append_digest(project_root: &Path, line: &str, now_ms: u64) {
    let path = project_root.join("reports").join("report_digest.md");
    if let Ok(mut file) = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
        let _ = file.write_all(format!("- [{now_ms}] {line}\n").as_bytes()).await;
    }
}

async fn append_event(project_root: &Path, kind: &str, step_id: &str, now_ms: u64) {
    let path = project_root.join("manager").join("events.jsonl");
    let row = serde_json::json!({"kind": kind, "step_id": step_id, "at_ms": now_ms});
    if let Ok(mut file) = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
        let _ = file.write_all(format!("{row}\n").as_bytes()).await;
    }
}

async fn tail_file(path: &Path, lines: usize) -> String {
    let Ok(text) = tokio::fs::read_to_string(path).await else { return String::new() };
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

async fn build_planner_prompt(project: &ResearchProjectState, project_root: &Path, feedback_events: &[String]) -> String {
    let hypotheses = tail_file(&project_root.join("idea/hypotheses.yaml"), TAIL_LINES).await;
    let registry = tail_file(&project_root.join("exp/registry.jsonl"), TAIL_LINES).await;
    let report = tail_file(&project_root.join("reports/rolling_report.md"), TAIL_LINES).await;

    let mut sections = vec![
        format!("Goal: {}", project.goal),
        format!("Status: {:?}, phase: {:?}", project.status, project.phase),
        format!("Counters: {} steps, {} runs", project.counters.steps, project.counters.runs),
    ];
    if !hypotheses.is_empty() {
        sections.push(format!("Hypotheses (tail):\n{hypotheses}"));
    }
    if !registry.is_empty() {
        sections.push(format!("Registry (tail):\n{registry}"));
    }
    if !report.is_empty() {
        sections.push(format!("Rolling report (tail):\n{report}"));
    }
    if !feedback_events.is_empty() {
        sections.push(format!("New feedback since last tick:\n{}", feedback_events.join("\n")));
    }
    sections.push("Respond with exactly one [[research-decision]]{...}[[/research-decision]] block shaped {stepId, research_update, actions:[]}.".to_string());
    sections.join("\n\n")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Whether the auto-tick loop should submit a manager step for this
/// conversation right now.
pub fn due_for_tick(project: &ResearchProjectState, auto_run: bool, last_tick_ms: Option<u64>, cooldown_ms: u64, now_ms: u64, active_job_running: bool) -> bool {
    if !auto_run || project.status != relay_core::research::ResearchStatus::Running || active_job_running {
        return false;
    }
    match last_tick_ms {
        Some(last) => now_ms.saturating_sub(last) >= cooldown_ms,
        None => true,
    }
}

/// Reacts to the job-watcher's post-job hook (§4.I `maybe_research_hook`):
/// invalid metrics force the project into `blocked` with a digest entry;
/// valid metrics signal the caller to re-kick the tick immediately.
pub async fn apply_post_job(project: &mut ResearchProjectState, post: &crate::job_watcher::ResearchPostJob, now_ms: u64) -> bool {
    if !post.metrics_valid {
        project.status = relay_core::research::ResearchStatus::Blocked;
        project.auto_run = false;
        append_digest(&post.project_root, "Blocked: invalid run metrics", now_ms).await;
        return false;
    }
    true
}

#[cfg(test)]
#[path = "research_tests.rs"]
mod tests;
