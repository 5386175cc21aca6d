// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A `ChatTransport` that writes to stdout. Used as the daemon's default
//! transport in place of a real Discord gateway connection, which is an
//! external collaborator this workspace does not implement.

use crate::transport::{ChatTransport, FetchedMessage, OutboundMessage, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct ConsoleChatTransport {
    next_id: AtomicU64,
    sent: Arc<Mutex<HashMap<String, (String, String)>>>,
}

impl ConsoleChatTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> String {
        format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatTransport for ConsoleChatTransport {
    async fn send_message(&self, message: OutboundMessage) -> Result<String, TransportError> {
        let id = self.allocate_id();
        println!("[{}] {}", message.channel_id, message.text);
        self.sent.lock().insert(id.clone(), (message.channel_id, message.text));
        Ok(id)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, text: &str) -> Result<(), TransportError> {
        println!("[{channel_id}] (edit {message_id}) {text}");
        self.sent.lock().insert(message_id.to_string(), (channel_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply_to_message(
        &self,
        channel_id: &str,
        reply_to_message_id: &str,
        text: &str,
    ) -> Result<String, TransportError> {
        let id = self.allocate_id();
        println!("[{channel_id}] (reply to {reply_to_message_id}) {text}");
        self.sent.lock().insert(id.clone(), (channel_id.to_string(), text.to_string()));
        Ok(id)
    }

    async fn fetch_channel_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<FetchedMessage, TransportError> {
        let sent = self.sent.lock();
        let (stored_channel, text) = sent
            .get(message_id)
            .ok_or_else(|| TransportError::Fetch(format!("unknown message {message_id}")))?;
        if stored_channel != channel_id {
            return Err(TransportError::Fetch("channel mismatch".to_string()));
        }
        Ok(FetchedMessage {
            message_id: message_id.to_string(),
            channel_id: stored_channel.clone(),
            author_id: "relay".to_string(),
            text: text.clone(),
        })
    }
}

#[cfg(test)]
#[path = "console_transport_tests.rs"]
mod tests;
