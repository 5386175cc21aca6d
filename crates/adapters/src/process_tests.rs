// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn build_child_env_strips_claudecode_vars() {
    std::env::set_var("CLAUDECODE_SESSION", "abc");
    std::env::set_var("KEEP_ME", "1");

    let env = build_child_env(None);

    std::env::remove_var("CLAUDECODE_SESSION");
    std::env::remove_var("KEEP_ME");

    assert!(!env.contains_key("CLAUDECODE_SESSION"));
    assert!(env.contains_key("KEEP_ME"));
}

#[test]
fn build_child_env_injects_upload_root() {
    let env = build_child_env(Some(std::path::Path::new("/tmp/uploads")));
    assert_eq!(env.get("RELAY_UPLOAD_ROOT").map(String::as_str), Some("/tmp/uploads"));
}

#[tokio::test]
async fn spawn_child_runs_and_exits() {
    let env = build_child_env(None);
    let child = spawn_child("true", &[], &env, None).unwrap();
    let status = wait_with_timeout(child, Duration::from_secs(5)).await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn wait_with_timeout_zero_disables_timeout() {
    let env = build_child_env(None);
    let child = spawn_child("true", &[], &env, None).unwrap();
    let status = wait_with_timeout(child, Duration::ZERO).await.unwrap();
    assert!(status.success());
}
