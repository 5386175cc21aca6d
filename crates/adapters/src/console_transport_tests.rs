// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn send_then_fetch_round_trips() {
    let transport = ConsoleChatTransport::new();
    let id = transport
        .send_message(OutboundMessage { channel_id: "c1".to_string(), text: "hi".to_string() })
        .await
        .unwrap();

    let fetched = transport.fetch_channel_message("c1", &id).await.unwrap();
    assert_eq!(fetched.text, "hi");
}

#[tokio::test]
async fn edit_message_updates_stored_text() {
    let transport = ConsoleChatTransport::new();
    let id = transport
        .send_message(OutboundMessage { channel_id: "c1".to_string(), text: "hi".to_string() })
        .await
        .unwrap();

    transport.edit_message("c1", &id, "bye").await.unwrap();

    let fetched = transport.fetch_channel_message("c1", &id).await.unwrap();
    assert_eq!(fetched.text, "bye");
}

#[tokio::test]
async fn fetch_unknown_message_errors() {
    let transport = ConsoleChatTransport::new();
    let result = transport.fetch_channel_message("c1", "nope").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fetch_wrong_channel_errors() {
    let transport = ConsoleChatTransport::new();
    let id = transport
        .send_message(OutboundMessage { channel_id: "c1".to_string(), text: "hi".to_string() })
        .await
        .unwrap();

    let result = transport.fetch_channel_message("c2", &id).await;
    assert!(result.is_err());
}
