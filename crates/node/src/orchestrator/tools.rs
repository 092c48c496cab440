// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local tool registry: tools the node executes in-process, keyed by name.
//! Anything not registered here is delegated to the worker queue.

use async_trait::async_trait;
use sc_broker::ProcessRegistry;
use sc_vault::Vault;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::NodeError;
use crate::scheduler::Scheduler;
use crate::traits::{ChannelSink, MemoryIndex};

/// A tool executed in-process by the orchestrator.
#[async_trait]
pub trait LocalTool: Send + Sync {
    async fn call(&self, input: Value, channel_id: &str) -> Result<String, NodeError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn LocalTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, tool: Arc<dyn LocalTool>) {
        self.tools.insert(name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

// --- Built-in local tools ---

/// `send_message`: push an intermediate message straight to the channel.
pub struct SendMessageTool {
    pub sink: Arc<dyn ChannelSink>,
}

#[async_trait]
impl LocalTool for SendMessageTool {
    async fn call(&self, input: Value, channel_id: &str) -> Result<String, NodeError> {
        let text = input
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Invalid("send_message needs text".into()))?;
        self.sink.send_text(channel_id, text).await?;
        Ok("sent".to_string())
    }
}

/// `memory_search`: query long-term memory.
pub struct MemorySearchTool {
    pub memory: Arc<dyn MemoryIndex>,
}

#[async_trait]
impl LocalTool for MemorySearchTool {
    async fn call(&self, input: Value, _channel_id: &str) -> Result<String, NodeError> {
        let query = input.get("query").and_then(Value::as_str).unwrap_or_default();
        let hits = self.memory.search(query, 8).await?;
        if hits.is_empty() {
            return Ok("no matching memories".to_string());
        }
        Ok(hits.join("\n"))
    }
}

/// `vault_list`: secret names only, never values.
pub struct VaultListTool {
    pub vault: Arc<Vault>,
}

#[async_trait]
impl LocalTool for VaultListTool {
    async fn call(&self, _input: Value, _channel_id: &str) -> Result<String, NodeError> {
        let names = self.vault.list().await?;
        Ok(if names.is_empty() { "vault is empty".to_string() } else { names.join(", ") })
    }
}

/// `system_info`: registered processes and version.
pub struct SystemInfoTool {
    pub registry: ProcessRegistry,
}

#[async_trait]
impl LocalTool for SystemInfoTool {
    async fn call(&self, _input: Value, _channel_id: &str) -> Result<String, NodeError> {
        let processes = self.registry.list().await?;
        let lines: Vec<String> = processes
            .iter()
            .map(|p| format!("{} {} up {}s (concurrency {})", p.process_type, p.id, p.uptime, p.concurrency))
            .collect();
        Ok(format!(
            "version {}\n{}",
            env!("CARGO_PKG_VERSION"),
            if lines.is_empty() { "no registered processes".to_string() } else { lines.join("\n") }
        ))
    }
}

/// `schedule_reminder`: one-shot reminder via the scheduler.
pub struct ScheduleReminderTool {
    pub scheduler: Arc<Scheduler>,
}

#[async_trait]
impl LocalTool for ScheduleReminderTool {
    async fn call(&self, input: Value, channel_id: &str) -> Result<String, NodeError> {
        let description = input
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Invalid("schedule_reminder needs description".into()))?;
        let delay_ms = input
            .get("delayMs")
            .and_then(Value::as_u64)
            .ok_or_else(|| NodeError::Invalid("schedule_reminder needs delayMs".into()))?;
        let id = self.scheduler.create_reminder(channel_id, description, delay_ms).await?;
        Ok(format!("reminder {id} scheduled"))
    }
}

/// `schedule_task`: one-shot deferred task via the scheduler.
pub struct ScheduleTaskTool {
    pub scheduler: Arc<Scheduler>,
}

#[async_trait]
impl LocalTool for ScheduleTaskTool {
    async fn call(&self, input: Value, channel_id: &str) -> Result<String, NodeError> {
        let description = input
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Invalid("schedule_task needs description".into()))?;
        let delay_ms = input
            .get("delayMs")
            .and_then(Value::as_u64)
            .ok_or_else(|| NodeError::Invalid("schedule_task needs delayMs".into()))?;
        let id = self.scheduler.create_task(channel_id, description, delay_ms).await?;
        Ok(format!("task {id} scheduled"))
    }
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
