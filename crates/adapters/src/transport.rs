// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The abstract chat surface the core consumes. The wire protocol for any
//! concrete transport (a real Discord gateway connection) is an external
//! collaborator, not covered here.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("edit failed: {0}")]
    Edit(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("transport timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub text: String,
}

/// `SendMessage`, `EditMessage`, `ReplyToMessage`, `FetchChannelMessage` —
/// exactly the four operations the core needs from a chat surface.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, message: OutboundMessage) -> Result<String, TransportError>;

    async fn edit_message(&self, channel_id: &str, message_id: &str, text: &str) -> Result<(), TransportError>;

    async fn reply_to_message(
        &self,
        channel_id: &str,
        reply_to_message_id: &str,
        text: &str,
    ) -> Result<String, TransportError>;

    async fn fetch_channel_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<FetchedMessage, TransportError>;
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
