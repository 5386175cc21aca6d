// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use std::io::Write;

#[test]
fn default_config_has_sane_timeouts() {
    let config = Config::default();
    assert_eq!(config.agent_timeout, Duration::from_secs(600));
    assert_eq!(config.wait_pattern_guard_mode, GuardMode::Warn);
}

#[test]
fn load_missing_file_falls_back_to_defaults() {
    let config = Config::load(std::path::Path::new("/nonexistent/config.toml")).unwrap();
    assert_eq!(config.transient_retry_max, 2);
}

#[test]
fn load_applies_file_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "transient_retry_max = 1").unwrap();
    writeln!(file, "progress_max_lines = 3").unwrap();
    drop(file);

    let config = Config::load(&path).unwrap();
    assert_eq!(config.transient_retry_max, 1);
    assert_eq!(config.progress_max_lines, 3);
}

#[test]
#[serial]
fn env_var_overrides_file_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "transient_retry_max = 1\n").unwrap();

    std::env::set_var("RELAY_TRANSIENT_RETRY_MAX", "3");
    let config = Config::load(&path).unwrap();
    std::env::remove_var("RELAY_TRANSIENT_RETRY_MAX");

    assert_eq!(config.transient_retry_max, 3);
}

#[test]
#[serial]
fn invalid_env_guard_mode_is_rejected() {
    std::env::set_var("RELAY_WAIT_PATTERN_GUARD_MODE", "nonsense");
    let result = Config::load(std::path::Path::new("/nonexistent/config.toml"));
    std::env::remove_var("RELAY_WAIT_PATTERN_GUARD_MODE");
    assert!(result.is_err());
}
