// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parse_ps_tree_finds_direct_children() {
    let output = "  PID  PPID\n    1     0\n  100     1\n  101   100\n  200     1\n";
    let tree = parse_ps_tree(output, 1);
    assert!(tree.contains(&100));
    assert!(tree.contains(&101));
    assert!(tree.contains(&200));
}

#[test]
fn parse_ps_tree_excludes_unrelated_processes() {
    let output = "  PID  PPID\n    1     0\n  100     1\n  999     5\n";
    let tree = parse_ps_tree(output, 1);
    assert!(!tree.contains(&999));
}

#[test]
fn parse_ps_tree_handles_empty_output() {
    let tree = parse_ps_tree("  PID  PPID\n", 1);
    assert!(tree.is_empty());
}

#[test]
fn stop_pid_then_continue_pid_round_trips_process_state() {
    let mut child = std::process::Command::new("sleep").arg("5").spawn().expect("spawn sleep");
    let pid = child.id() as i32;
    std::thread::sleep(std::time::Duration::from_millis(50));

    stop_pid(pid).expect("SIGSTOP");
    std::thread::sleep(std::time::Duration::from_millis(50));
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).expect("read /proc stat");
    assert!(stat.contains(") T "), "expected stopped state, got: {stat}");

    continue_pid(pid).expect("SIGCONT");
    std::thread::sleep(std::time::Duration::from_millis(50));
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).expect("read /proc stat");
    assert!(!stat.contains(") T "), "expected resumed state, got: {stat}");

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn discovery_order_feeds_stop_order_leaves_first_root_last() {
    // stop_order reverses process_tree()'s discovery order and appends the
    // root last; verify that composition directly against a fixed tree.
    let output = "  PID  PPID\n    1     0\n  100     1\n  101   100\n";
    let mut tree = parse_ps_tree(output, 1);
    assert_eq!(tree, vec![100, 101]);
    tree.reverse();
    tree.push(1);
    assert_eq!(tree, vec![101, 100, 1]);
}
