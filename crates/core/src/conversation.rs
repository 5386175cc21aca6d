// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ConversationKey`: a stable string identifying a chat context.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationKeyParseError {
    #[error("empty conversation key")]
    Empty,
    #[error("unrecognized conversation key shape: {0:?}")]
    UnrecognizedShape(String),
}

/// `dm:<userId>` | `discord:<guildId>:channel:<cid>` | `discord:<guildId>:thread:<tid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConversationKey {
    Dm { user_id: String },
    GuildChannel { guild_id: String, channel_id: String },
    GuildThread { guild_id: String, thread_id: String },
}

impl ConversationKey {
    pub fn dm(user_id: impl Into<String>) -> Self {
        Self::Dm { user_id: user_id.into() }
    }

    pub fn guild_channel(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self::GuildChannel { guild_id: guild_id.into(), channel_id: channel_id.into() }
    }

    pub fn guild_thread(guild_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self::GuildThread { guild_id: guild_id.into(), thread_id: thread_id.into() }
    }

    /// Is this conversation a direct message (relevant to DM-only action gating).
    pub fn is_dm(&self) -> bool {
        matches!(self, ConversationKey::Dm { .. })
    }

    /// Filesystem-safe representation used for on-disk layout (`uploads/<sanitized>/…`).
    pub fn sanitized(&self) -> String {
        self.to_string().replace([':', '/'], "_")
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Dm { user_id } => write!(f, "dm:{user_id}"),
            ConversationKey::GuildChannel { guild_id, channel_id } => {
                write!(f, "discord:{guild_id}:channel:{channel_id}")
            }
            ConversationKey::GuildThread { guild_id, thread_id } => {
                write!(f, "discord:{guild_id}:thread:{thread_id}")
            }
        }
    }
}

impl FromStr for ConversationKey {
    type Err = ConversationKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConversationKeyParseError::Empty);
        }
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            ["dm", user_id] if !user_id.is_empty() => Ok(Self::dm(*user_id)),
            ["discord", guild_id, "channel", channel_id]
                if !guild_id.is_empty() && !channel_id.is_empty() =>
            {
                Ok(Self::guild_channel(*guild_id, *channel_id))
            }
            ["discord", guild_id, "thread", thread_id]
                if !guild_id.is_empty() && !thread_id.is_empty() =>
            {
                Ok(Self::guild_thread(*guild_id, *thread_id))
            }
            _ => Err(ConversationKeyParseError::UnrecognizedShape(s.to_string())),
        }
    }
}

impl TryFrom<String> for ConversationKey {
    type Error = ConversationKeyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ConversationKey> for String {
    fn from(key: ConversationKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
#[path = "conversation_tests.rs"]
mod tests;
