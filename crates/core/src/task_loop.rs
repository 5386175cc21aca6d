// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Ralph loop's run-state, tracked per session.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskLoop {
    pub running: bool,
    pub stop_requested: bool,
    pub current_task_id: Option<String>,
}

impl TaskLoop {
    pub fn start(&mut self) {
        self.running = true;
        self.stop_requested = false;
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn exit(&mut self) {
        self.running = false;
        self.stop_requested = false;
        self.current_task_id = None;
    }

    /// Resets all fields to idle. Called by the storage normalizer on load:
    /// a running Ralph loop cannot have survived a restart.
    pub fn reset_on_load(&mut self) {
        *self = TaskLoop::default();
    }
}

#[cfg(test)]
#[path = "task_loop_tests.rs"]
mod tests;
