// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `FakeChatTransport`: an in-memory `ChatTransport` for engine tests.
//! Records every send/edit so tests can assert on the exact sequence of
//! status-message edits a run produced.

use crate::transport::{ChatTransport, FetchedMessage, OutboundMessage, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub channel_id: String,
    pub message_id: String,
    pub text: String,
}

#[derive(Default)]
pub struct FakeChatTransport {
    next_id: AtomicU64,
    messages: Arc<Mutex<Vec<RecordedMessage>>>,
    /// When set, the next `send_message`/`edit_message` call fails once.
    fail_next: Arc<Mutex<bool>>,
}

impl FakeChatTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_call(&self) {
        *self.fail_next.lock() = true;
    }

    pub fn sent_messages(&self) -> Vec<RecordedMessage> {
        self.messages.lock().clone()
    }

    pub fn last_text_for(&self, channel_id: &str) -> Option<String> {
        self.messages.lock().iter().rev().find(|m| m.channel_id == channel_id).map(|m| m.text.clone())
    }

    fn take_failure(&self) -> bool {
        let mut fail = self.fail_next.lock();
        if *fail {
            *fail = false;
            true
        } else {
            false
        }
    }

    fn allocate_id(&self) -> String {
        format!("fake-msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatTransport for FakeChatTransport {
    async fn send_message(&self, message: OutboundMessage) -> Result<String, TransportError> {
        if self.take_failure() {
            return Err(TransportError::Send("injected failure".to_string()));
        }
        let id = self.allocate_id();
        self.messages.lock().push(RecordedMessage {
            channel_id: message.channel_id,
            message_id: id.clone(),
            text: message.text,
        });
        Ok(id)
    }

    async fn edit_message(&self, channel_id: &str, message_id: &str, text: &str) -> Result<(), TransportError> {
        if self.take_failure() {
            return Err(TransportError::Edit("injected failure".to_string()));
        }
        self.messages.lock().push(RecordedMessage {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn reply_to_message(
        &self,
        channel_id: &str,
        _reply_to_message_id: &str,
        text: &str,
    ) -> Result<String, TransportError> {
        self.send_message(OutboundMessage { channel_id: channel_id.to_string(), text: text.to_string() }).await
    }

    async fn fetch_channel_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<FetchedMessage, TransportError> {
        let messages = self.messages.lock();
        let found = messages
            .iter()
            .rev()
            .find(|m| m.channel_id == channel_id && m.message_id == message_id)
            .ok_or_else(|| TransportError::Fetch(format!("unknown message {message_id}")))?;
        Ok(FetchedMessage {
            message_id: found.message_id.clone(),
            channel_id: found.channel_id.clone(),
            author_id: "relay".to_string(),
            text: found.text.clone(),
        })
    }
}

#[cfg(test)]
#[path = "fake_transport_tests.rs"]
mod tests;
