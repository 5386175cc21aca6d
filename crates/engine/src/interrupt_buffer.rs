// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `InterruptSnapshotBuffer`: a bounded per-conversation ring of recent
//! progress lines, used only to build the run snapshot handed to `/ask`'s
//! ephemeral agent invocation. Split out from the progress reporter per
//! Design Notes' explicit recommendation (Open Question 4).

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// How many recent lines are retained per conversation.
pub const SNAPSHOT_CAPACITY: usize = 200;

#[derive(Default)]
pub struct InterruptSnapshotBuffer {
    lines: Mutex<HashMap<String, VecDeque<String>>>,
}

impl InterruptSnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, conversation_key: &str, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        let ring = lines.entry(conversation_key.to_string()).or_default();
        if ring.len() >= SNAPSHOT_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(line.into());
    }

    /// Returns up to the last `count` lines for `conversation_key`, oldest
    /// first, for `/ask`'s "recent progress lines" snapshot section.
    pub fn recent(&self, conversation_key: &str, count: usize) -> Vec<String> {
        let lines = self.lines.lock();
        match lines.get(conversation_key) {
            Some(ring) => ring.iter().rev().take(count).rev().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn clear(&self, conversation_key: &str) {
        self.lines.lock().remove(conversation_key);
    }
}

#[cfg(test)]
#[path = "interrupt_buffer_tests.rs"]
mod tests;
