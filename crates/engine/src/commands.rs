// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component 6: the chat-surface command grammar (`/help`, `/task`,
//! `/worktree`, …). Parses a raw message into a [`Command`], then applies
//! whatever part of it is pure session/disk state here. Commands that must
//! invoke an agent, pause a running child, or drive the task loop are left
//! as an [`Intent`] for the caller, which already owns the collaborators
//! (`AgentRunner`, `PriorityQuestionRunner`, `task_runner::run_loop`) this
//! module has no handle on.

use crate::relay_actions::{apply_task_add, apply_task_run};
use crate::EngineError;
use relay_core::job::JobStatus;
use relay_core::session::Session;
use relay_core::task::TaskStatus;
use relay_storage::paths::Layout;
use std::path::PathBuf;
use tokio::process::Command as ShellCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanRef {
    Id(String),
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    Done,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    Add(String),
    List,
    Run,
    Stop,
    Clear(ClearScope),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorktreeCommand {
    List,
    New { name: String, from: Option<String>, use_it: bool },
    Use(String),
    Rm { name: String, force: bool },
    Prune,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanCommand {
    Request(String),
    New(String),
    List,
    Show(PlanRef),
    Queue { plan: PlanRef, run: bool },
    Apply { plan: PlanRef, confirm: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffArgs {
    pub dry_run: bool,
    pub commit: Option<bool>,
    pub push: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchCommand {
    Start(String),
    Status,
    Run,
    Step,
    Pause,
    Stop,
    Note(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoTarget {
    Actions,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoCommand {
    pub target: AutoTarget,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OvernightCommand {
    Start(String),
    Status,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCommand {
    List,
    Logs(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpCommand {
    Run { task_id: String, kv: Vec<(String, String)> },
    Best { kv: Vec<(String, String)> },
    Report { kv: Vec<(String, String)> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Ask(String),
    Inject(String),
    Reset,
    Workdir(PathBuf),
    Attach(String),
    Upload(String),
    Context { reload: bool },
    Task(TaskCommand),
    Worktree(WorktreeCommand),
    Plan(PlanCommand),
    Handoff(HandoffArgs),
    Research(ResearchCommand),
    Auto(AutoCommand),
    Go(String),
    Overnight(OvernightCommand),
    Job(JobCommand),
    Exp(ExpCommand),
}

/// What the caller must do after a [`Command`]'s local effects (if any)
/// have been applied. `None` means the command was fully handled here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    RunAgent { prompt: String },
    Ask { question: String },
    Inject { prompt: String },
    StartTaskLoop,
    /// Caller must run one `run_manager_step` tick against `session.research`.
    ResearchStep,
}

fn split_first(rest: &str) -> (&str, &str) {
    match rest.trim().split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (rest.trim(), ""),
    }
}

fn parse_kv_pairs(rest: &str) -> Vec<(String, String)> {
    rest.split_whitespace()
        .filter_map(|token| token.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn parse_plan_ref(token: &str) -> Result<PlanRef, String> {
    if token.eq_ignore_ascii_case("last") {
        Ok(PlanRef::Last)
    } else if token.is_empty() {
        Err("expected a plan id or 'last'".to_string())
    } else {
        Ok(PlanRef::Id(token.to_string()))
    }
}

/// Parses one chat message into a [`Command`]. `text` must already have
/// been confirmed to start with `/`; the leading slash is stripped here.
pub fn parse(text: &str) -> Result<Command, String> {
    let text = text.trim();
    let Some(body) = text.strip_prefix('/') else {
        return Err("commands must start with '/'".to_string());
    };
    let (name, rest) = split_first(body);
    let name = name.to_ascii_lowercase();

    match name.as_str() {
        "help" => Ok(Command::Help),
        "status" => Ok(Command::Status),
        "ask" if !rest.is_empty() => Ok(Command::Ask(rest.to_string())),
        "ask" => Err("/ask requires a question".to_string()),
        "inject" if !rest.is_empty() => Ok(Command::Inject(rest.to_string())),
        "inject" => Err("/inject requires replacement text".to_string()),
        "reset" => Ok(Command::Reset),
        "workdir" if !rest.is_empty() => Ok(Command::Workdir(PathBuf::from(rest))),
        "workdir" => Err("/workdir requires an absolute path".to_string()),
        "attach" if !rest.is_empty() => Ok(Command::Attach(rest.to_string())),
        "attach" => Err("/attach requires a session id".to_string()),
        "upload" if !rest.is_empty() => Ok(Command::Upload(rest.to_string())),
        "upload" => Err("/upload requires a path".to_string()),
        "context" => Ok(Command::Context { reload: rest.eq_ignore_ascii_case("reload") }),
        "go" if !rest.is_empty() => Ok(Command::Go(rest.to_string())),
        "go" => Err("/go requires a task description".to_string()),
        "task" => parse_task(rest).map(Command::Task),
        "worktree" => parse_worktree(rest).map(Command::Worktree),
        "plan" => parse_plan(rest).map(Command::Plan),
        "handoff" => Ok(Command::Handoff(parse_handoff(rest))),
        "research" => parse_research(rest).map(Command::Research),
        "auto" => parse_auto(rest).map(Command::Auto),
        "overnight" => parse_overnight(rest).map(Command::Overnight),
        "job" => parse_job(rest).map(Command::Job),
        "exp" => parse_exp(rest).map(Command::Exp),
        other => Err(format!("unknown command: /{other}")),
    }
}

fn parse_task(rest: &str) -> Result<TaskCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "add" if !tail.is_empty() => Ok(TaskCommand::Add(tail.to_string())),
        "add" => Err("/task add requires task text".to_string()),
        "list" => Ok(TaskCommand::List),
        "run" => Ok(TaskCommand::Run),
        "stop" => Ok(TaskCommand::Stop),
        "clear" => match tail.to_ascii_lowercase().as_str() {
            "" | "done" => Ok(TaskCommand::Clear(ClearScope::Done)),
            "all" => Ok(TaskCommand::Clear(ClearScope::All)),
            other => Err(format!("/task clear: unknown scope {other:?}")),
        },
        other => Err(format!("unknown /task subcommand: {other}")),
    }
}

fn parse_worktree(rest: &str) -> Result<WorktreeCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "list" => Ok(WorktreeCommand::List),
        "new" => {
            let mut parts = tail.split_whitespace();
            let name = parts.next().ok_or("/worktree new requires a name")?.to_string();
            let mut from = None;
            let mut use_it = false;
            let rest: Vec<&str> = parts.collect();
            let mut i = 0;
            while i < rest.len() {
                match rest[i] {
                    "--from" => {
                        i += 1;
                        from = rest.get(i).map(|s| s.to_string());
                    }
                    "--use" => use_it = true,
                    other => return Err(format!("/worktree new: unrecognized flag {other:?}")),
                }
                i += 1;
            }
            Ok(WorktreeCommand::New { name, from, use_it })
        }
        "use" if !tail.is_empty() => Ok(WorktreeCommand::Use(tail.to_string())),
        "use" => Err("/worktree use requires a name".to_string()),
        "rm" => {
            let mut parts = tail.split_whitespace();
            let name = parts.next().ok_or("/worktree rm requires a name")?.to_string();
            let force = parts.any(|flag| flag == "--force");
            Ok(WorktreeCommand::Rm { name, force })
        }
        "prune" => Ok(WorktreeCommand::Prune),
        other => Err(format!("unknown /worktree subcommand: {other}")),
    }
}

fn parse_plan(rest: &str) -> Result<PlanCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "new" if !tail.is_empty() => Ok(PlanCommand::New(tail.to_string())),
        "new" => Err("/plan new requires a request".to_string()),
        "list" => Ok(PlanCommand::List),
        "show" => parse_plan_ref(tail).map(PlanCommand::Show),
        "queue" => {
            let (id_token, flags) = split_first(tail);
            let plan = parse_plan_ref(id_token)?;
            let run = flags.split_whitespace().any(|f| f == "--run");
            Ok(PlanCommand::Queue { plan, run })
        }
        "apply" => {
            let (id_token, flags) = split_first(tail);
            let plan = parse_plan_ref(id_token)?;
            let confirm = flags.split_whitespace().any(|f| f == "--confirm");
            Ok(PlanCommand::Apply { plan, confirm })
        }
        // Bare `/plan <request>` is shorthand for `/plan new <request>`.
        _ if !rest.is_empty() => Ok(PlanCommand::Request(rest.to_string())),
        _ => Err("/plan requires a request or subcommand".to_string()),
    }
}

fn parse_handoff(rest: &str) -> HandoffArgs {
    let mut args = HandoffArgs::default();
    for flag in rest.split_whitespace() {
        match flag {
            "--dry-run" => args.dry_run = true,
            "--commit" => args.commit = Some(true),
            "--no-commit" => args.commit = Some(false),
            "--push" => args.push = Some(true),
            "--no-push" => args.push = Some(false),
            _ => {}
        }
    }
    args
}

fn parse_research(rest: &str) -> Result<ResearchCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "start" if !tail.is_empty() => Ok(ResearchCommand::Start(tail.to_string())),
        "start" => Err("/research start requires a goal".to_string()),
        "status" => Ok(ResearchCommand::Status),
        "run" => Ok(ResearchCommand::Run),
        "step" => Ok(ResearchCommand::Step),
        "pause" => Ok(ResearchCommand::Pause),
        "stop" => Ok(ResearchCommand::Stop),
        "note" if !tail.is_empty() => Ok(ResearchCommand::Note(tail.to_string())),
        "note" => Err("/research note requires text".to_string()),
        other => Err(format!("unknown /research subcommand: {other}")),
    }
}

fn parse_auto(rest: &str) -> Result<AutoCommand, String> {
    let (target, tail) = split_first(rest);
    let target = match target.to_ascii_lowercase().as_str() {
        "actions" => AutoTarget::Actions,
        "research" => AutoTarget::Research,
        other => return Err(format!("unknown /auto target: {other}")),
    };
    let on = match tail.to_ascii_lowercase().as_str() {
        "on" => true,
        "off" => false,
        other => return Err(format!("/auto expects on|off, got {other:?}")),
    };
    Ok(AutoCommand { target, on })
}

fn parse_overnight(rest: &str) -> Result<OvernightCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "start" if !tail.is_empty() => Ok(OvernightCommand::Start(tail.to_string())),
        "start" => Err("/overnight start requires a goal".to_string()),
        "status" => Ok(OvernightCommand::Status),
        "stop" => Ok(OvernightCommand::Stop),
        other => Err(format!("unknown /overnight subcommand: {other}")),
    }
}

fn parse_job(rest: &str) -> Result<JobCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "list" => Ok(JobCommand::List),
        "logs" => Ok(JobCommand::Logs(if tail.is_empty() { None } else { Some(tail.to_string()) })),
        other => Err(format!("unknown /job subcommand: {other}")),
    }
}

fn parse_exp(rest: &str) -> Result<ExpCommand, String> {
    let (sub, tail) = split_first(rest);
    match sub.to_ascii_lowercase().as_str() {
        "run" => {
            let (task_id, kv_text) = split_first(tail);
            if task_id.is_empty() {
                return Err("/exp run requires a task id".to_string());
            }
            Ok(ExpCommand::Run { task_id: task_id.to_string(), kv: parse_kv_pairs(kv_text) })
        }
        "best" => Ok(ExpCommand::Best { kv: parse_kv_pairs(tail) }),
        "report" => Ok(ExpCommand::Report { kv: parse_kv_pairs(tail) }),
        other => Err(format!("unknown /exp subcommand: {other}")),
    }
}

const HELP_TEXT: &str = "Commands: /help /status /ask <q> /inject <i> /reset /workdir <abs> /attach <sid> /upload <path> /context [reload] /task /worktree /plan /handoff /research /auto /go <task> /overnight /job /exp";

/// Applies `command`'s local (non-agent) effects against `session`, and
/// returns the reply text plus whatever the caller must still do.
pub async fn handle(command: Command, session: &mut Session, layout: &Layout, now_ms: u64) -> Result<(String, Option<Intent>), EngineError> {
    match command {
        Command::Help => Ok((HELP_TEXT.to_string(), None)),
        Command::Status => Ok((render_status(session), None)),
        Command::Ask(question) => Ok((String::new(), Some(Intent::Ask { question }))),
        Command::Inject(prompt) => Ok((String::new(), Some(Intent::Inject { prompt }))),
        Command::Reset => {
            session.external_session_id = None;
            session.bootstrap_version = 0;
            Ok(("Session reset; the next message starts a fresh agent session.".to_string(), None))
        }
        Command::Workdir(path) => {
            session.workdir = path.clone();
            Ok((format!("Workdir set to {}", path.display()), None))
        }
        Command::Attach(session_id) => {
            session.external_session_id = Some(session_id.clone());
            Ok((format!("Attached to session {session_id}"), None))
        }
        Command::Upload(_path) => Ok(("Upload handling happens as part of the next agent reply.".to_string(), None)),
        Command::Context { reload } => {
            if reload {
                session.bootstrap_version = 0;
                Ok(("Context will be reloaded on the next message.".to_string(), None))
            } else {
                Ok((format!("Context bootstrap version: {}", session.bootstrap_version), None))
            }
        }
        Command::Go(task) => match apply_task_add(session, task.clone(), task, now_ms).and_then(|id| apply_task_run(session).map(|()| id)) {
            Ok(id) => Ok((format!("Queued {id} and started the task loop."), Some(Intent::StartTaskLoop))),
            Err(reason) => Ok((reason, None)),
        },
        Command::Task(cmd) => handle_task(cmd, session, now_ms),
        Command::Worktree(cmd) => handle_worktree(cmd, session, layout).await,
        Command::Plan(cmd) => handle_plan(cmd, session, layout, now_ms).await,
        Command::Handoff(args) => handle_handoff(args, session).await,
        Command::Research(cmd) => handle_research(cmd, session, now_ms).await,
        Command::Auto(cmd) => {
            match cmd.target {
                AutoTarget::Actions => session.auto.actions = cmd.on,
                AutoTarget::Research => session.auto.research = cmd.on,
            }
            Ok((format!("auto {:?} is now {}", cmd.target, if cmd.on { "on" } else { "off" }), None))
        }
        Command::Overnight(cmd) => handle_overnight(cmd, session, now_ms),
        Command::Job(cmd) => Ok((handle_job(cmd, session), None)),
        Command::Exp(cmd) => handle_exp(cmd, session, layout, now_ms).await,
    }
}

fn render_status(session: &Session) -> String {
    let running_task = session.running_task().map(|t| t.id.as_str()).unwrap_or("none");
    let running_job = session.running_job().map(|j| j.id.as_str()).unwrap_or("none");
    let pending = session.tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
    format!(
        "workdir: {}\nresume session: {}\nrunning task: {running_task} ({pending} pending)\nrunning job: {running_job}\nauto.actions: {}\nauto.research: {}",
        session.workdir.display(),
        session.external_session_id.as_deref().unwrap_or("none"),
        session.auto.actions,
        session.auto.research,
    )
}

fn handle_task(cmd: TaskCommand, session: &mut Session, now_ms: u64) -> Result<(String, Option<Intent>), EngineError> {
    match cmd {
        TaskCommand::Add(text) => match apply_task_add(session, text.clone(), text, now_ms) {
            Ok(id) => Ok((format!("Queued task {id}"), None)),
            Err(reason) => Ok((reason, None)),
        },
        TaskCommand::List => {
            if session.tasks.is_empty() {
                return Ok(("No tasks queued.".to_string(), None));
            }
            let lines: Vec<String> = session.tasks.iter().map(|t| format!("{} [{:?}] {}", t.id, t.status, t.description)).collect();
            Ok((lines.join("\n"), None))
        }
        TaskCommand::Run => match apply_task_run(session) {
            Ok(()) => Ok(("Starting the task loop.".to_string(), Some(Intent::StartTaskLoop))),
            Err(reason) => Ok((reason, None)),
        },
        TaskCommand::Stop => {
            session.task_loop.request_stop();
            Ok(("Stop requested; the loop exits after the current task.".to_string(), None))
        }
        TaskCommand::Clear(scope) => {
            let before = session.tasks.len();
            session.tasks.retain(|t| match scope {
                ClearScope::Done => !matches!(t.status, TaskStatus::Done | TaskStatus::Canceled),
                ClearScope::All => t.status == TaskStatus::Running,
            });
            let removed = before - session.tasks.len();
            Ok((format!("Cleared {removed} task(s)."), None))
        }
    }
}

fn handle_job(cmd: JobCommand, session: &Session) -> String {
    match cmd {
        JobCommand::List => {
            if session.jobs.is_empty() {
                return "No jobs.".to_string();
            }
            session.jobs.iter().map(|j| format!("{} [{:?}] {}", j.id, j.status, j.command)).collect::<Vec<_>>().join("\n")
        }
        JobCommand::Logs(id) => {
            let job = match id {
                Some(id) => session.jobs.iter().find(|j| j.id == id),
                None => session.jobs.iter().find(|j| j.status == JobStatus::Running).or_else(|| session.jobs.last()),
            };
            match job {
                Some(job) => std::fs::read_to_string(&job.paths.log_path).unwrap_or_else(|err| format!("could not read log for {}: {err}", job.id)),
                None => "No matching job.".to_string(),
            }
        }
    }
}

async fn handle_worktree(cmd: WorktreeCommand, session: &mut Session, layout: &Layout) -> Result<(String, Option<Intent>), EngineError> {
    let repo_slug = repo_slug(&session.workdir);
    match cmd {
        WorktreeCommand::List => {
            let dir = layout.worktrees_dir(&repo_slug);
            let mut names = Vec::new();
            if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
                while let Some(entry) = entries.next_entry().await? {
                    if entry.file_type().await?.is_dir() {
                        names.push(entry.file_name().to_string_lossy().to_string());
                    }
                }
            }
            names.sort();
            Ok((if names.is_empty() { "No worktrees.".to_string() } else { names.join("\n") }, None))
        }
        WorktreeCommand::New { name, from, use_it } => {
            let target = layout.worktree_dir(&repo_slug, &name);
            let parent = target.parent().ok_or_else(|| std::io::Error::other(format!("worktree path {} has no parent", target.display())))?;
            tokio::fs::create_dir_all(parent).await?;
            let mut args = vec!["worktree".to_string(), "add".to_string(), target.display().to_string()];
            if let Some(reference) = &from {
                args.push(reference.clone());
            }
            run_git(&session.workdir, &args).await?;
            if use_it {
                session.workdir = target.clone();
            }
            Ok((format!("Worktree {name} created at {}", target.display()), None))
        }
        WorktreeCommand::Use(name) => {
            let target = layout.worktree_dir(&repo_slug, &name);
            if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
                return Ok((format!("Worktree {name} does not exist."), None));
            }
            session.workdir = target.clone();
            Ok((format!("Switched workdir to {}", target.display()), None))
        }
        WorktreeCommand::Rm { name, force } => {
            let target = layout.worktree_dir(&repo_slug, &name);
            let mut args = vec!["worktree".to_string(), "remove".to_string(), target.display().to_string()];
            if force {
                args.push("--force".to_string());
            }
            run_git(&session.workdir, &args).await?;
            Ok((format!("Removed worktree {name}"), None))
        }
        WorktreeCommand::Prune => {
            run_git(&session.workdir, &["worktree".to_string(), "prune".to_string()]).await?;
            Ok(("Pruned stale worktree records.".to_string(), None))
        }
    }
}

/// Filesystem-safe stand-in for "the repo this workdir belongs to": the
/// workdir's own final path component. Good enough to namespace
/// `worktrees/<repo-slug>/…` without shelling out to discover a remote URL.
fn repo_slug(workdir: &std::path::Path) -> String {
    workdir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "repo".to_string())
}

async fn run_git(workdir: &std::path::Path, args: &[String]) -> std::io::Result<()> {
    let status = ShellCommand::new("git").args(args).current_dir(workdir).status().await?;
    if !status.success() {
        return Err(std::io::Error::other(format!("git {args:?} failed with {status}")));
    }
    Ok(())
}

fn resolve_plan<'a>(session: &'a Session, plan: &PlanRef) -> Option<&'a relay_core::plan::Plan> {
    match plan {
        PlanRef::Last => session.plans.last(),
        PlanRef::Id(id) => session.plans.iter().find(|p| &p.id == id),
    }
}

async fn handle_plan(cmd: PlanCommand, session: &mut Session, _layout: &Layout, now_ms: u64) -> Result<(String, Option<Intent>), EngineError> {
    match cmd {
        PlanCommand::Request(req) | PlanCommand::New(req) => {
            let prompt = format!("Produce a step-by-step implementation plan for:\n\n{req}\n\nReply with the plan in markdown only.");
            Ok((String::new(), Some(Intent::RunAgent { prompt })))
        }
        PlanCommand::List => {
            if session.plans.is_empty() {
                return Ok(("No saved plans.".to_string(), None));
            }
            Ok((session.plans.iter().map(|p| format!("{} {}", p.id, p.title)).collect::<Vec<_>>().join("\n"), None))
        }
        PlanCommand::Show(plan_ref) => match resolve_plan(session, &plan_ref) {
            Some(plan) => {
                let text = tokio::fs::read_to_string(&plan.markdown_path).await.unwrap_or_else(|err| format!("could not read plan file: {err}"));
                Ok((text, None))
            }
            None => Ok(("No matching plan.".to_string(), None)),
        },
        PlanCommand::Queue { plan, run } => match resolve_plan(session, &plan).cloned() {
            Some(plan) => match apply_task_add(session, plan.title.clone(), plan.request_text.clone(), now_ms) {
                Ok(id) if run => match apply_task_run(session) {
                    Ok(()) => Ok((format!("Queued plan {} as task {id} and started the loop.", plan.id), Some(Intent::StartTaskLoop))),
                    Err(reason) => Ok((reason, None)),
                },
                Ok(id) => Ok((format!("Queued plan {} as task {id}.", plan.id), None)),
                Err(reason) => Ok((reason, None)),
            },
            None => Ok(("No matching plan.".to_string(), None)),
        },
        PlanCommand::Apply { plan, confirm } => {
            if !confirm {
                return Ok(("Pass --confirm to apply a plan.".to_string(), None));
            }
            match resolve_plan(session, &plan).cloned() {
                Some(plan) => {
                    let prompt = format!("Apply the following previously approved plan verbatim:\n\n{}", plan.request_text);
                    Ok((String::new(), Some(Intent::RunAgent { prompt })))
                }
                None => Ok(("No matching plan.".to_string(), None)),
            }
        }
    }
}

async fn handle_handoff(args: HandoffArgs, session: &Session) -> Result<(String, Option<Intent>), EngineError> {
    let do_commit = args.commit.unwrap_or(true) && !args.dry_run;
    let do_push = args.push.unwrap_or(false) && !args.dry_run;

    if args.dry_run {
        return Ok(("Dry run: no commit or push performed.".to_string(), None));
    }

    let mut summary = Vec::new();
    if do_commit {
        let add = ShellCommand::new("git").arg("add").arg("-A").current_dir(&session.workdir).status().await?;
        if !add.success() {
            return Ok(("git add failed; handoff aborted.".to_string(), None));
        }
        let diff = ShellCommand::new("git").arg("diff").arg("--cached").arg("--quiet").current_dir(&session.workdir).status().await?;
        if diff.success() {
            summary.push("nothing to commit".to_string());
        } else {
            let commit = ShellCommand::new("git").arg("commit").arg("-m").arg("handoff: checkpoint").current_dir(&session.workdir).status().await?;
            summary.push(if commit.success() { "committed".to_string() } else { "commit failed".to_string() });
        }
    }
    if do_push {
        let push = ShellCommand::new("git").arg("push").current_dir(&session.workdir).status().await?;
        summary.push(if push.success() { "pushed".to_string() } else { "push failed".to_string() });
    }
    Ok((format!("Handoff: {}", summary.join(", ")), None))
}

async fn handle_research(cmd: ResearchCommand, session: &mut Session, now_ms: u64) -> Result<(String, Option<Intent>), EngineError> {
    match cmd {
        ResearchCommand::Start(goal) => {
            let slug = slugify(&goal);
            let stamp = now_ms;
            let project_root = session.workdir.join("research").join(format!("{stamp}-{slug}"));
            crate::research::scaffold_project(&project_root, &goal).await?;
            let project = relay_core::research::ResearchProjectState::new(project_root.clone(), goal, relay_core::research::Budgets { max_steps: 200, max_wall_clock_minutes: 0, max_runs: 200 });
            crate::research::save_project_state(&project_root, &project).await?;
            session.research = Some(relay_core::research::ResearchBinding {
                enabled: true,
                project_root: project_root.clone(),
                slug,
                manager_conv_key: format!("research:{}", session.conversation_key),
                last_note_at_ms: None,
            });
            Ok((format!("Research project started at {}", project_root.display()), None))
        }
        ResearchCommand::Status => match &session.research {
            Some(binding) => match crate::research::load_project_state(&binding.project_root).await? {
                Some(project) => Ok((format!("status: {:?}, steps: {}, runs: {}", project.status, project.counters.steps, project.counters.runs), None)),
                None => Ok(("Research project has no state yet.".to_string(), None)),
            },
            None => Ok(("No research project bound to this conversation.".to_string(), None)),
        },
        ResearchCommand::Run | ResearchCommand::Step => match &session.research {
            Some(_) => Ok((String::new(), Some(Intent::ResearchStep))),
            None => Ok(("No research project bound to this conversation.".to_string(), None)),
        },
        ResearchCommand::Pause => match &session.research {
            Some(binding) => {
                if let Some(mut project) = crate::research::load_project_state(&binding.project_root).await? {
                    project.status = relay_core::research::ResearchStatus::Paused;
                    project.auto_run = false;
                    crate::research::save_project_state(&binding.project_root, &project).await?;
                }
                Ok(("Research paused.".to_string(), None))
            }
            None => Ok(("No research project bound to this conversation.".to_string(), None)),
        },
        ResearchCommand::Stop => match &session.research {
            Some(binding) => {
                if let Some(mut project) = crate::research::load_project_state(&binding.project_root).await? {
                    project.status = relay_core::research::ResearchStatus::Done;
                    project.auto_run = false;
                    crate::research::save_project_state(&binding.project_root, &project).await?;
                }
                Ok(("Research stopped.".to_string(), None))
            }
            None => Ok(("No research project bound to this conversation.".to_string(), None)),
        },
        ResearchCommand::Note(text) => match &mut session.research {
            Some(binding) => {
                let line = format!("[{now_ms}] note: {text}\n");
                let path = binding.project_root.join("manager").join("events.jsonl");
                let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
                use tokio::io::AsyncWriteExt;
                file.write_all(line.as_bytes()).await?;
                binding.last_note_at_ms = Some(now_ms);
                Ok(("Note recorded.".to_string(), None))
            }
            None => Ok(("No research project bound to this conversation.".to_string(), None)),
        },
    }
}

fn slugify(text: &str) -> String {
    let mut slug: String = text.to_ascii_lowercase().chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }).collect();
    slug.truncate(40);
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

fn handle_overnight(cmd: OvernightCommand, session: &mut Session, now_ms: u64) -> (String, Option<Intent>) {
    match cmd {
        OvernightCommand::Start(goal) => {
            session.auto.actions = true;
            match apply_task_add(session, goal.clone(), goal, now_ms) {
                Ok(id) => match apply_task_run(session) {
                    Ok(()) => (format!("Overnight run queued as {id}; auto-actions enabled."), Some(Intent::StartTaskLoop)),
                    Err(err) => (err, None),
                },
                Err(err) => (err, None),
            }
        }
        OvernightCommand::Status => {
            let running = session.task_loop.running;
            let pending = session.tasks.iter().filter(|t| t.status == TaskStatus::Pending).count();
            (format!("task loop running: {running}, pending: {pending}"), None)
        }
        OvernightCommand::Stop => {
            session.task_loop.request_stop();
            ("Stop requested.".to_string(), None)
        }
    }
}

fn render_kv_args(kv: &[(String, String)]) -> Vec<String> {
    kv.iter().map(|(k, v)| format!("--{k}={v}")).collect()
}

async fn handle_exp(cmd: ExpCommand, session: &mut Session, layout: &Layout, now_ms: u64) -> Result<(String, Option<Intent>), EngineError> {
    let sanitized = session.conversation_key.replace([':', '/'], "_");
    let (script, mut args, job_suffix) = match &cmd {
        ExpCommand::Run { task_id, kv } => ("scripts/run_experiment.py".to_string(), { let mut a = vec!["--task".to_string(), task_id.clone()]; a.extend(render_kv_args(kv)); a }, format!("exp-run-{task_id}")),
        ExpCommand::Best { kv } => ("scripts/best_experiment.py".to_string(), render_kv_args(kv), "exp-best".to_string()),
        ExpCommand::Report { kv } => ("scripts/report_experiment.py".to_string(), render_kv_args(kv), "exp-report".to_string()),
    };
    let mut command_parts = vec!["python3".to_string(), script];
    command_parts.append(&mut args);
    let command = command_parts.join(" ");

    let job_id = format!("{job_suffix}-{now_ms}");
    let request = crate::job_supervisor::StartJobRequest {
        conversation_key: session.conversation_key.clone(),
        sanitized_conv_key: sanitized,
        job_id: job_id.clone(),
        command,
        description: Some(job_suffix),
        workdir: session.workdir.clone(),
        watch: relay_core::job::WatchConfig::minimal(15, 60),
    };
    let job = crate::job_supervisor::start_job(layout, request, now_ms).await?;
    session.jobs.push(job);
    Ok((format!("Started job {job_id}"), None))
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
