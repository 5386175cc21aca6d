// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated newtype for the external agent's opaque session handle.
//!
//! Trusted as a path component and state-lookup key only after construction
//! validates it against the same shape `/attach` accepts — an untrusted
//! session-id string must never reach the filesystem or state map raw.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid agent session id: {0:?}")]
pub struct AgentSessionIdError(pub String);

/// Matches the id grammar accepted by `/attach`: alphanumeric, `-`, `_`,
/// 1..=128 characters. No path separators, no leading dot.
#[allow(clippy::expect_used)]
fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").expect("constant regex pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentSessionId(String);

impl AgentSessionId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, AgentSessionIdError> {
        let raw = raw.into();
        if pattern().is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(AgentSessionIdError(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for AgentSessionId {
    type Error = AgentSessionIdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<AgentSessionId> for String {
    fn from(id: AgentSessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[path = "agent_session_id_tests.rs"]
mod tests;
