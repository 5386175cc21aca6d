// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component A: the immutable configuration value object, loaded once at
//! process startup from environment variables with a `config.toml`
//! override file underneath (env wins over file, file wins over defaults).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    Off,
    #[default]
    Warn,
    Reject,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ParseFile { path: PathBuf, #[source] source: toml::de::Error },
    #[error("invalid environment variable {name}: {value:?}")]
    InvalidEnvVar { name: String, value: String },
}

/// File-level overlay, deserialized from `config.toml`. Every field is
/// optional; present fields override the built-in default, and are
/// themselves overridden by environment variables of the same name
/// uppercased with a `RELAY_` prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub agent_timeout_secs: Option<u64>,
    pub transient_retry_max: Option<u8>,
    pub heavy_model_min_prompt_chars: Option<usize>,
    pub heavy_model_keywords: Option<Vec<String>>,
    pub quota_fallback_model: Option<String>,
    pub workdir_allow_roots: Option<Vec<PathBuf>>,
    pub upload_allow_roots: Option<Vec<PathBuf>>,
    pub wait_pattern_guard_mode: Option<GuardMode>,
    pub startup_heartbeat_secs: Option<u64>,
    pub heartbeat_every_secs: Option<u64>,
    pub stale_cpu_pct: Option<f32>,
    pub stale_gpu_pct: Option<f32>,
    pub stale_minutes: Option<u64>,
    pub alert_every_minutes: Option<u64>,
    pub min_edit_ms: Option<u64>,
    pub heartbeat_ms: Option<u64>,
    pub edit_timeout_ms: Option<u64>,
    pub stall_warn_ms: Option<u64>,
    pub progress_max_lines: Option<usize>,
    pub relay_actions_enabled: Option<bool>,
    pub relay_actions_dm_only: Option<bool>,
    pub relay_actions_max_per_message: Option<usize>,
    pub task_queue_max_pending: Option<usize>,
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub agent_timeout: Duration,
    pub transient_retry_max: u8,
    pub heavy_model_min_prompt_chars: usize,
    pub heavy_model_keywords: Vec<String>,
    pub quota_fallback_model: String,
    pub workdir_allow_roots: Vec<PathBuf>,
    pub upload_allow_roots: Vec<PathBuf>,
    pub wait_pattern_guard_mode: GuardMode,
    pub startup_heartbeat_secs: u64,
    pub heartbeat_every_secs: u64,
    pub stale_cpu_pct: f32,
    pub stale_gpu_pct: f32,
    pub stale_minutes: u64,
    pub alert_every_minutes: u64,
    pub min_edit_ms: u64,
    pub heartbeat_ms: u64,
    pub edit_timeout_ms: u64,
    pub stall_warn_ms: u64,
    pub progress_max_lines: usize,
    pub relay_actions_enabled: bool,
    pub relay_actions_dm_only: bool,
    pub relay_actions_max_per_message: usize,
    pub task_queue_max_pending: usize,
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = dirs::state_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("relay");
        Self {
            agent_timeout: Duration::from_secs(600),
            transient_retry_max: 2,
            heavy_model_min_prompt_chars: 4000,
            heavy_model_keywords: vec!["deep".into(), "thorough".into(), "comprehensive".into()],
            quota_fallback_model: "claude-3-5-haiku".into(),
            workdir_allow_roots: vec![PathBuf::from("/home"), PathBuf::from("/workspace")],
            upload_allow_roots: vec![PathBuf::from("/tmp")],
            wait_pattern_guard_mode: GuardMode::default(),
            startup_heartbeat_secs: 60,
            heartbeat_every_secs: 300,
            stale_cpu_pct: 2.0,
            stale_gpu_pct: 2.0,
            stale_minutes: 15,
            alert_every_minutes: 30,
            min_edit_ms: 1500,
            heartbeat_ms: 20_000,
            edit_timeout_ms: 8_000,
            stall_warn_ms: 45_000,
            progress_max_lines: 12,
            relay_actions_enabled: true,
            relay_actions_dm_only: false,
            relay_actions_max_per_message: 4,
            task_queue_max_pending: 50,
            state_dir,
        }
    }
}

impl Config {
    /// Loads a `config.toml` overlay if present, then applies `RELAY_*`
    /// environment variable overrides, matching the teacher's layered
    /// config precedent (file, then env, on top of built-in defaults).
    pub fn load(config_path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::ReadFile { path: config_path.to_path_buf(), source })?;
            let file: ConfigFile = toml::from_str(&contents)
                .map_err(|source| ConfigError::ParseFile { path: config_path.to_path_buf(), source })?;
            config.apply_file(file);
        }

        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.agent_timeout_secs { self.agent_timeout = Duration::from_secs(v); }
        if let Some(v) = file.transient_retry_max { self.transient_retry_max = v; }
        if let Some(v) = file.heavy_model_min_prompt_chars { self.heavy_model_min_prompt_chars = v; }
        if let Some(v) = file.heavy_model_keywords { self.heavy_model_keywords = v; }
        if let Some(v) = file.quota_fallback_model { self.quota_fallback_model = v; }
        if let Some(v) = file.workdir_allow_roots { self.workdir_allow_roots = v; }
        if let Some(v) = file.upload_allow_roots { self.upload_allow_roots = v; }
        if let Some(v) = file.wait_pattern_guard_mode { self.wait_pattern_guard_mode = v; }
        if let Some(v) = file.startup_heartbeat_secs { self.startup_heartbeat_secs = v; }
        if let Some(v) = file.heartbeat_every_secs { self.heartbeat_every_secs = v; }
        if let Some(v) = file.stale_cpu_pct { self.stale_cpu_pct = v; }
        if let Some(v) = file.stale_gpu_pct { self.stale_gpu_pct = v; }
        if let Some(v) = file.stale_minutes { self.stale_minutes = v; }
        if let Some(v) = file.alert_every_minutes { self.alert_every_minutes = v; }
        if let Some(v) = file.min_edit_ms { self.min_edit_ms = v; }
        if let Some(v) = file.heartbeat_ms { self.heartbeat_ms = v; }
        if let Some(v) = file.edit_timeout_ms { self.edit_timeout_ms = v; }
        if let Some(v) = file.stall_warn_ms { self.stall_warn_ms = v; }
        if let Some(v) = file.progress_max_lines { self.progress_max_lines = v; }
        if let Some(v) = file.relay_actions_enabled { self.relay_actions_enabled = v; }
        if let Some(v) = file.relay_actions_dm_only { self.relay_actions_dm_only = v; }
        if let Some(v) = file.relay_actions_max_per_message { self.relay_actions_max_per_message = v; }
        if let Some(v) = file.task_queue_max_pending { self.task_queue_max_pending = v; }
        if let Some(v) = file.state_dir { self.state_dir = v; }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("RELAY_AGENT_TIMEOUT_SECS") {
            self.agent_timeout = Duration::from_secs(parse_env("RELAY_AGENT_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("RELAY_TRANSIENT_RETRY_MAX") {
            self.transient_retry_max = parse_env("RELAY_TRANSIENT_RETRY_MAX", &v)?;
        }
        if let Ok(v) = std::env::var("RELAY_STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("RELAY_WAIT_PATTERN_GUARD_MODE") {
            self.wait_pattern_guard_mode = match v.to_lowercase().as_str() {
                "off" => GuardMode::Off,
                "warn" => GuardMode::Warn,
                "reject" => GuardMode::Reject,
                _ => {
                    return Err(ConfigError::InvalidEnvVar {
                        name: "RELAY_WAIT_PATTERN_GUARD_MODE".to_string(),
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnvVar { name: name.to_string(), value: value.to_string() })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
