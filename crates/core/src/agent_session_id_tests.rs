// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn accepts_alphanumeric_with_dashes() {
    assert!(AgentSessionId::parse("T1-abc_123").is_ok());
}

#[test]
fn rejects_empty() {
    assert!(AgentSessionId::parse("").is_err());
}

#[test]
fn rejects_path_separators() {
    assert!(AgentSessionId::parse("../etc/passwd").is_err());
    assert!(AgentSessionId::parse("a/b").is_err());
}

#[test]
fn rejects_leading_special_char() {
    assert!(AgentSessionId::parse("-abc").is_err());
    assert!(AgentSessionId::parse(".abc").is_err());
}

#[test]
fn display_roundtrip() {
    let id = AgentSessionId::parse("T1").unwrap();
    assert_eq!(id.to_string(), "T1");
    assert_eq!(id.as_str(), "T1");
}
