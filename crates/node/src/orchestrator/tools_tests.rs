// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::traits::fakes::{CollectingSink, NullMemoryIndex};

#[test]
fn registry_lookup_and_names() {
    let mut registry = ToolRegistry::new();
    registry.register(
        "send_message",
        Arc::new(SendMessageTool { sink: Arc::new(CollectingSink::default()) }),
    );
    registry.register(
        "memory_search",
        Arc::new(MemorySearchTool { memory: Arc::new(NullMemoryIndex::default()) }),
    );
    assert!(registry.get("send_message").is_some());
    assert!(registry.get("nope").is_none());
    assert_eq!(registry.names(), vec!["memory_search", "send_message"]);
}

#[tokio::test]
async fn send_message_pushes_to_sink() {
    let sink = CollectingSink::default();
    let tool = SendMessageTool { sink: Arc::new(sink.clone()) };
    let result = tool
        .call(serde_json::json!({"text": "on it"}), "telegram")
        .await
        .unwrap();
    assert_eq!(result, "sent");
    assert_eq!(sink.sent.lock()[0], ("telegram".to_string(), "on it".to_string()));
}

#[tokio::test]
async fn send_message_without_text_is_invalid() {
    let tool = SendMessageTool { sink: Arc::new(CollectingSink::default()) };
    let err = tool.call(serde_json::json!({}), "telegram").await.unwrap_err();
    assert!(matches!(err, crate::error::NodeError::Invalid(_)));
}

#[tokio::test]
async fn memory_search_reports_empty_index() {
    let tool = MemorySearchTool { memory: Arc::new(NullMemoryIndex::default()) };
    let result = tool
        .call(serde_json::json!({"query": "birthdays"}), "gateway")
        .await
        .unwrap();
    assert_eq!(result, "no matching memories");
}
