// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named interfaces to out-of-scope collaborators.
//!
//! LLM provider HTTP clients, the SQLite message/memory stores, and the
//! chat-platform adapters live outside this repository; the node talks to
//! them only through these traits. Fakes for tests sit at the bottom.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;

// --- Chat provider ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One conversation turn held by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), tool_calls: vec![], tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content: content.into(), tool_calls, tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

/// The chat LLM. One call per orchestrator iteration.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        turns: &[Turn],
        abort: &CancellationToken,
    ) -> Result<ProviderResponse, NodeError>;
}

// --- Message store ---

/// Persisted chat history. Blocked inbound messages are stored with their
/// block reason and never reach the orchestrator.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        channel_id: &str,
        role: Role,
        content: &str,
        blocked_reason: Option<&str>,
    ) -> Result<(), NodeError>;

    async fn recent(&self, channel_id: &str, limit: usize) -> Result<Vec<Turn>, NodeError>;

    async fn clear(&self, channel_id: &str) -> Result<u64, NodeError>;
}

// --- Channel sink ---

/// Outbound delivery to a chat platform.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), NodeError>;

    async fn send_file(
        &self,
        channel_id: &str,
        path: &str,
        caption: Option<&str>,
    ) -> Result<(), NodeError>;
}

// --- Usage store ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub daily_tokens: u64,
    pub monthly_tokens: u64,
}

/// Token accounting backing the budget.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, usage: TokenUsage) -> Result<(), NodeError>;
    async fn totals(&self) -> Result<UsageTotals, NodeError>;
}

// --- Bus seams ---

/// Progress publication, faked in tests. Production is the Redis bus.
#[async_trait]
pub trait ProgressPublish: Send + Sync {
    async fn publish(
        &self,
        channel_id: &str,
        event: &sc_core::ProgressEvent,
    ) -> Result<(), NodeError>;
}

#[async_trait]
impl ProgressPublish for sc_broker::ProgressBus {
    async fn publish(
        &self,
        channel_id: &str,
        event: &sc_core::ProgressEvent,
    ) -> Result<(), NodeError> {
        sc_broker::ProgressBus::publish(self, channel_id, event).await?;
        Ok(())
    }
}

/// The cancel-bus operations the node pipeline needs.
#[async_trait]
pub trait CancelOps: Send + Sync {
    /// Consume the job's (or global) cancel flag; one observer wins.
    async fn consume_flag(&self, job_id: &str) -> Result<bool, NodeError>;
    async fn request_cancel(&self, job_id: &str) -> Result<(), NodeError>;
    async fn track(&self, channel_id: &str, job_id: &str) -> Result<(), NodeError>;
    async fn untrack(&self, channel_id: &str, job_id: &str) -> Result<(), NodeError>;
    /// Cancel every tracked job for a channel; returns how many.
    async fn cancel_all(&self, channel_id: &str) -> Result<usize, NodeError>;
    /// Register a fresh abort token for a job in the local registry.
    fn register_abort(&self, job_id: &str) -> CancellationToken;
    fn unregister_abort(&self, job_id: &str);
}

#[async_trait]
impl CancelOps for sc_broker::CancelBus {
    async fn consume_flag(&self, job_id: &str) -> Result<bool, NodeError> {
        Ok(self.consume_cancel_flag(job_id).await?)
    }

    async fn request_cancel(&self, job_id: &str) -> Result<(), NodeError> {
        Ok(self.request_job_cancel(job_id).await?)
    }

    async fn track(&self, channel_id: &str, job_id: &str) -> Result<(), NodeError> {
        Ok(self.track_job(channel_id, job_id).await?)
    }

    async fn untrack(&self, channel_id: &str, job_id: &str) -> Result<(), NodeError> {
        Ok(self.untrack_job(channel_id, job_id).await?)
    }

    async fn cancel_all(&self, channel_id: &str) -> Result<usize, NodeError> {
        Ok(self.cancel_all_for_channel(channel_id).await?)
    }

    fn register_abort(&self, job_id: &str) -> CancellationToken {
        self.registry().register(job_id)
    }

    fn unregister_abort(&self, job_id: &str) {
        self.registry().unregister(job_id)
    }
}

/// Outcome of a delegated worker job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegatedResult {
    Completed(String),
    Failed(String),
    TimedOut,
    /// The run was aborted while the job was in flight; the job was
    /// cancelled on the worker.
    Aborted,
}

/// Dispatch of tool/skill jobs to the worker fleet.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Enqueue on the tools queue and await the terminal progress event.
    async fn dispatch_and_wait(
        &self,
        channel_id: &str,
        payload: sc_core::JobPayload,
        abort: &CancellationToken,
    ) -> Result<DelegatedResult, NodeError>;

    /// Fire-and-forget enqueue (memory extraction, scheduled fires).
    async fn enqueue(&self, spec: sc_core::JobSpec) -> Result<String, NodeError>;
}

// --- Memory index ---

/// Long-term memory: async fact extraction and search.
#[async_trait]
pub trait MemoryIndex: Send + Sync {
    async fn extract(
        &self,
        channel_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), NodeError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, NodeError>;
}

// --- Test fakes ---

pub mod fakes {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Scripted provider: pops one pre-programmed response per call.
    #[derive(Default)]
    pub struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        pub calls: Mutex<Vec<(String, Vec<Turn>)>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_text(&self, text: &str) {
            self.responses.lock().push_back(ProviderResponse {
                text: Some(text.to_string()),
                tool_calls: vec![],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
            });
        }

        pub fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
            self.responses.lock().push_back(ProviderResponse {
                text: None,
                tool_calls: vec![ToolCall {
                    id: format!("call-{name}"),
                    name: name.to_string(),
                    arguments,
                }],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
            });
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(
            &self,
            system: &str,
            turns: &[Turn],
            _abort: &CancellationToken,
        ) -> Result<ProviderResponse, NodeError> {
            self.calls.lock().push((system.to_string(), turns.to_vec()));
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| NodeError::Provider("script exhausted".into()))
        }
    }

    /// In-memory message store.
    #[derive(Default, Clone)]
    pub struct MemoryMessageStore {
        pub rows: Arc<Mutex<Vec<(String, Role, String, Option<String>)>>>,
    }

    #[async_trait]
    impl MessageStore for MemoryMessageStore {
        async fn append(
            &self,
            channel_id: &str,
            role: Role,
            content: &str,
            blocked_reason: Option<&str>,
        ) -> Result<(), NodeError> {
            self.rows.lock().push((
                channel_id.to_string(),
                role,
                content.to_string(),
                blocked_reason.map(String::from),
            ));
            Ok(())
        }

        async fn recent(&self, channel_id: &str, limit: usize) -> Result<Vec<Turn>, NodeError> {
            let rows = self.rows.lock();
            let mut turns: Vec<Turn> = rows
                .iter()
                .filter(|(c, _, _, blocked)| c == channel_id && blocked.is_none())
                .map(|(_, role, content, _)| Turn {
                    role: *role,
                    content: content.clone(),
                    tool_calls: vec![],
                    tool_call_id: None,
                })
                .collect();
            if turns.len() > limit {
                turns.drain(..turns.len() - limit);
            }
            Ok(turns)
        }

        async fn clear(&self, channel_id: &str) -> Result<u64, NodeError> {
            let mut rows = self.rows.lock();
            let before = rows.len();
            rows.retain(|(c, _, _, _)| c != channel_id);
            Ok((before - rows.len()) as u64)
        }
    }

    /// Collecting sink.
    #[derive(Default, Clone)]
    pub struct CollectingSink {
        pub sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl ChannelSink for CollectingSink {
        async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), NodeError> {
            self.sent.lock().push((channel_id.to_string(), text.to_string()));
            Ok(())
        }

        async fn send_file(
            &self,
            channel_id: &str,
            path: &str,
            _caption: Option<&str>,
        ) -> Result<(), NodeError> {
            self.sent.lock().push((channel_id.to_string(), format!("file:{path}")));
            Ok(())
        }
    }

    /// In-memory usage totals.
    #[derive(Default, Clone)]
    pub struct MemoryUsageStore {
        pub totals: Arc<Mutex<UsageTotals>>,
    }

    #[async_trait]
    impl UsageStore for MemoryUsageStore {
        async fn record(&self, usage: TokenUsage) -> Result<(), NodeError> {
            let mut totals = self.totals.lock();
            totals.daily_tokens += usage.total();
            totals.monthly_tokens += usage.total();
            Ok(())
        }

        async fn totals(&self) -> Result<UsageTotals, NodeError> {
            Ok(*self.totals.lock())
        }
    }

    /// Collecting progress bus.
    #[derive(Default, Clone)]
    pub struct CollectingProgress {
        pub events: Arc<Mutex<Vec<(String, sc_core::ProgressEvent)>>>,
    }

    impl CollectingProgress {
        pub fn kinds_for(&self, job_id: &str) -> Vec<sc_core::ProgressKind> {
            self.events
                .lock()
                .iter()
                .filter(|(_, e)| e.job_id == job_id)
                .map(|(_, e)| e.kind)
                .collect()
        }
    }

    #[async_trait]
    impl ProgressPublish for CollectingProgress {
        async fn publish(
            &self,
            channel_id: &str,
            event: &sc_core::ProgressEvent,
        ) -> Result<(), NodeError> {
            self.events.lock().push((channel_id.to_string(), event.clone()));
            Ok(())
        }
    }

    /// In-memory cancel state.
    #[derive(Default, Clone)]
    pub struct FakeCancel {
        pub flags: Arc<Mutex<std::collections::HashSet<String>>>,
        pub cancelled: Arc<Mutex<Vec<String>>>,
        pub tracked: Arc<Mutex<std::collections::HashSet<(String, String)>>>,
        registry: sc_broker::AbortRegistry,
    }

    impl FakeCancel {
        pub fn set_flag(&self, job_id: &str) {
            self.flags.lock().insert(job_id.to_string());
        }
    }

    #[async_trait]
    impl CancelOps for FakeCancel {
        async fn consume_flag(&self, job_id: &str) -> Result<bool, NodeError> {
            Ok(self.flags.lock().remove(job_id))
        }

        async fn request_cancel(&self, job_id: &str) -> Result<(), NodeError> {
            self.cancelled.lock().push(job_id.to_string());
            Ok(())
        }

        async fn track(&self, channel_id: &str, job_id: &str) -> Result<(), NodeError> {
            self.tracked.lock().insert((channel_id.to_string(), job_id.to_string()));
            Ok(())
        }

        async fn untrack(&self, channel_id: &str, job_id: &str) -> Result<(), NodeError> {
            self.tracked.lock().remove(&(channel_id.to_string(), job_id.to_string()));
            Ok(())
        }

        async fn cancel_all(&self, channel_id: &str) -> Result<usize, NodeError> {
            let mut tracked = self.tracked.lock();
            let victims: Vec<(String, String)> = tracked
                .iter()
                .filter(|(c, _)| c == channel_id)
                .cloned()
                .collect();
            for key in &victims {
                tracked.remove(key);
                self.cancelled.lock().push(key.1.clone());
            }
            Ok(victims.len())
        }

        fn register_abort(&self, job_id: &str) -> CancellationToken {
            self.registry.register(job_id)
        }

        fn unregister_abort(&self, job_id: &str) {
            self.registry.unregister(job_id)
        }
    }

    /// Scripted worker dispatch.
    #[derive(Default)]
    pub struct ScriptedDispatcher {
        pub results: Mutex<VecDeque<DelegatedResult>>,
        pub dispatched: Mutex<Vec<sc_core::JobPayload>>,
        pub enqueued: Mutex<Vec<sc_core::JobSpec>>,
    }

    impl ScriptedDispatcher {
        pub fn push(&self, result: DelegatedResult) {
            self.results.lock().push_back(result);
        }
    }

    #[async_trait]
    impl JobDispatcher for ScriptedDispatcher {
        async fn dispatch_and_wait(
            &self,
            _channel_id: &str,
            payload: sc_core::JobPayload,
            _abort: &CancellationToken,
        ) -> Result<DelegatedResult, NodeError> {
            self.dispatched.lock().push(payload);
            Ok(self
                .results
                .lock()
                .pop_front()
                .unwrap_or(DelegatedResult::Failed("no scripted result".into())))
        }

        async fn enqueue(&self, spec: sc_core::JobSpec) -> Result<String, NodeError> {
            let id = format!("job-fake-{}", self.enqueued.lock().len());
            self.enqueued.lock().push(spec);
            Ok(id)
        }
    }

    /// No-op memory index that records extraction calls.
    #[derive(Default, Clone)]
    pub struct NullMemoryIndex {
        pub extractions: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl MemoryIndex for NullMemoryIndex {
        async fn extract(
            &self,
            _channel_id: &str,
            _user_text: &str,
            _assistant_text: &str,
        ) -> Result<(), NodeError> {
            *self.extractions.lock() += 1;
            Ok(())
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>, NodeError> {
            Ok(vec![])
        }
    }
}
