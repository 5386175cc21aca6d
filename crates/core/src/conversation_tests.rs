// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_dm() {
    let key: ConversationKey = "dm:123".parse().unwrap();
    assert_eq!(key, ConversationKey::dm("123"));
    assert!(key.is_dm());
}

#[test]
fn parses_guild_channel() {
    let key: ConversationKey = "discord:g1:channel:c1".parse().unwrap();
    assert_eq!(key, ConversationKey::guild_channel("g1", "c1"));
    assert!(!key.is_dm());
}

#[test]
fn parses_guild_thread() {
    let key: ConversationKey = "discord:g1:thread:t1".parse().unwrap();
    assert_eq!(key, ConversationKey::guild_thread("g1", "t1"));
}

#[test]
fn round_trips_through_display() {
    let key = ConversationKey::guild_channel("g1", "c1");
    let round_tripped: ConversationKey = key.to_string().parse().unwrap();
    assert_eq!(key, round_tripped);
}

#[test]
fn rejects_empty() {
    let err = "".parse::<ConversationKey>().unwrap_err();
    assert_eq!(err, ConversationKeyParseError::Empty);
}

#[test]
fn rejects_unrecognized_shape() {
    let err = "slack:abc".parse::<ConversationKey>().unwrap_err();
    assert!(matches!(err, ConversationKeyParseError::UnrecognizedShape(_)));
}

#[test]
fn sanitized_strips_colons() {
    let key = ConversationKey::guild_channel("g1", "c1");
    assert_eq!(key.sanitized(), "discord_g1_channel_c1");
}

#[test]
fn serde_round_trip() {
    let key = ConversationKey::dm("42");
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, "\"dm:42\"");
    let back: ConversationKey = serde_json::from_str(&json).unwrap();
    assert_eq!(key, back);
}
