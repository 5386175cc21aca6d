// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-group signal delivery: `kill(-pid, sig)` with a fallback to
//! enumerating the process tree on platforms/processes where the negative
//! PID form is not valid (Design Notes: "explicit OS-specific helper; on
//! platforms without `setpgid`/`kill(-pid)`, fall back to enumerating the
//! process tree").

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

fn send_group_signal(pid: i32, signal: Signal) {
    // Negative PID targets the whole process group. The job wrapper and
    // every spawned child call `process_group(0)` so this is always valid
    // for processes this crate starts; the tree-enumeration fallback below
    // covers the agent CLI's own children if it forks without joining the
    // group.
    if signal::kill(Pid::from_raw(-pid), signal).is_ok() {
        return;
    }
    if signal::kill(Pid::from_raw(pid), signal).is_ok() {
        return;
    }
    for child_pid in process_tree(pid) {
        let _ = signal::kill(Pid::from_raw(child_pid), signal);
    }
}

pub fn terminate_process_group(pid: i32) {
    send_group_signal(pid, Signal::SIGTERM);
}

pub fn kill_process_group(pid: i32) {
    send_group_signal(pid, Signal::SIGKILL);
}

pub fn stop_process_group(pid: i32) {
    send_group_signal(pid, Signal::SIGSTOP);
}

pub fn continue_process_group(pid: i32) {
    send_group_signal(pid, Signal::SIGCONT);
}

/// Signals a single pid directly, not its process group. Used by the
/// priority-question interrupt, which pauses/resumes individual processes
/// in a tree rather than whole groups.
pub fn stop_pid(pid: i32) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid), Signal::SIGSTOP)
}

pub fn continue_pid(pid: i32) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid), Signal::SIGCONT)
}

/// Enumerates the process tree rooted at `root_pid` via `ps -eo pid,ppid`,
/// returning descendants in breadth-first order (root excluded).
pub fn process_tree(root_pid: i32) -> Vec<i32> {
    let output = match std::process::Command::new("ps").args(["-eo", "pid,ppid"]).output() {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };
    let text = String::from_utf8_lossy(&output.stdout);
    parse_ps_tree(&text, root_pid)
}

fn parse_ps_tree(ps_output: &str, root_pid: i32) -> Vec<i32> {
    let pairs: Vec<(i32, i32)> = ps_output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid: i32 = fields.next()?.parse().ok()?;
            let ppid: i32 = fields.next()?.parse().ok()?;
            Some((pid, ppid))
        })
        .collect();

    let mut descendants = Vec::new();
    let mut frontier = vec![root_pid];
    while let Some(parent) = frontier.pop() {
        for &(pid, ppid) in &pairs {
            if ppid == parent && !descendants.contains(&pid) {
                descendants.push(pid);
                frontier.push(pid);
            }
        }
    }
    descendants
}

/// Orders a process tree leaves-first (reverse of discovery order) for
/// `/ask`'s SIGSTOP sequencing: "leaves first (reverse order), root last".
pub fn stop_order(root_pid: i32) -> Vec<i32> {
    let mut tree = process_tree(root_pid);
    tree.reverse();
    tree.push(root_pid);
    tree
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
