// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NDJSON event vocabulary emitted by the child CLI's stdout stream.
//!
//! One enum per provider shape is NOT used; instead a single tagged enum
//! carries both providers' event kinds, with an `Other` variant that
//! preserves unrecognized payloads opaquely for forward compatibility
//! (Design Notes: "unknown kinds are preserved opaquely").

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Codex: `thread.started{thread_id}`.
    ThreadStarted { thread_id: String },
    /// Codex: `item.completed{agent_message,text}` and similar item kinds.
    ItemCompleted { item_type: String, text: Option<String> },
    /// Codex: final result envelope.
    Result { text: Option<String> },
    /// Claude stream-json: assistant message chunk.
    Assistant { text: Option<String> },
    /// Claude stream-json: `system`/`init` bootstrap event, also used as
    /// the documented bogus-at-exit transient.
    System { subtype: String },
    /// Tool invocation started.
    ToolUse { name: String, summary: Option<String> },
    /// Tool invocation result.
    ToolResult { name: String, summary: Option<String> },
    /// Model "thinking"/reasoning trace chunk.
    Reasoning { text: Option<String> },
    /// Shell command execution event.
    CommandExecution { command: String },
    /// File change event (edit/write/patch application).
    FileChange { path: String, summary: Option<String> },
    /// Anything not matched above, preserved verbatim.
    #[serde(other)]
    Other,
}

/// Full line that failed to parse as one event, kept for the non-JSON tail.
#[derive(Debug, Clone)]
pub struct RawLine {
    pub line: String,
}

/// Parses one NDJSON line into both the typed event and the raw JSON value
/// (the latter is needed by [`extract_session_id`] since provider-specific
/// fields like `session_id` live outside the matched variant's fields).
/// Lines that are valid JSON but an unrecognized shape still parse to
/// `AgentEvent::Other`; lines that are not JSON at all return `None` and
/// the caller keeps them in the bounded non-JSON tail instead.
pub fn parse_line(line: &str) -> Option<(Value, AgentEvent)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let event: AgentEvent = serde_json::from_value(value.clone()).ok()?;
    Some((value, event))
}

/// Attempts to extract a session/thread id from an event, regardless of
/// provider shape.
pub fn extract_session_id(event: &AgentEvent, raw: &Value) -> Option<String> {
    match event {
        AgentEvent::ThreadStarted { thread_id } => Some(thread_id.clone()),
        _ => raw
            .get("session_id")
            .or_else(|| raw.get("thread_id"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
