// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator: an iterative provider loop with tool dispatch.
//!
//! Each iteration makes exactly one provider call, then either finishes
//! with text or executes the returned tool calls (locally, or delegated to
//! the worker queue and awaited over the progress bus). Cancellation is
//! checked at every boundary; an abort mid-tool cancels the outstanding
//! worker job and exits without a terminal event.

pub mod dispatch;
pub mod prompt;
pub mod tools;

use sc_core::job::{JobPayload, JobSpec};
use sc_core::ProgressEvent;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::{Budget, BudgetDecision};
use crate::error::NodeError;
use crate::traits::{
    CancelOps, ChatProvider, DelegatedResult, JobDispatcher, MessageStore, ProgressPublish, Role,
    StopReason, ToolCall, Turn, UsageStore,
};

use prompt::PromptCache;
use tools::ToolRegistry;

/// Iteration cap; a loop that hasn't converged by then errors out.
const MAX_ITERATIONS: usize = 24;
/// History window fed to the provider.
const HISTORY_LIMIT: usize = 40;

pub struct Orchestrator {
    pub provider: Arc<dyn ChatProvider>,
    pub store: Arc<dyn MessageStore>,
    pub usage: Arc<dyn UsageStore>,
    pub budget: Arc<Budget>,
    pub progress: Arc<dyn ProgressPublish>,
    pub cancel: Arc<dyn CancelOps>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub prompt: Arc<PromptCache>,
    pub tools: Arc<ToolRegistry>,
}

impl Orchestrator {
    /// Run the loop for one inbound message. Returns `Ok(None)` when the
    /// job was cancelled (no terminal event must follow), `Ok(Some(text))`
    /// with the final assistant text otherwise.
    pub async fn run(
        &self,
        channel_id: &str,
        job_id: &str,
        text: &str,
        abort: &CancellationToken,
    ) -> Result<Option<String>, NodeError> {
        let mut turns = self.store.recent(channel_id, HISTORY_LIMIT).await?;
        // The processor persists the inbound turn before invoking us; don't
        // feed it to the provider twice.
        if turns.last().is_some_and(|t| t.role == Role::User && t.content == text) {
            turns.pop();
        }
        turns.push(Turn::user(text));

        for iteration in 0..MAX_ITERATIONS {
            if self.should_stop(job_id, abort).await {
                info!(job = job_id, iteration, "orchestration cancelled");
                return Ok(None);
            }

            if let BudgetDecision::Blocked { reason } = self.budget.check().await? {
                return Err(NodeError::BudgetExceeded(reason));
            }

            let system = self.prompt.assemble();
            let response = self.provider.complete(&system, &turns, abort).await?;
            if let Err(e) = self.usage.record(response.usage).await {
                warn!(error = %e, "usage record failed");
            }

            if response.stop_reason == StopReason::Cancelled {
                return Ok(None);
            }

            if response.tool_calls.is_empty() {
                let final_text = response.text.unwrap_or_default();
                debug!(job = job_id, iteration, "loop finished with text");
                return Ok(Some(final_text));
            }

            // Narrate the iteration before the tools run.
            let narration = response
                .text
                .clone()
                .unwrap_or_else(|| describe_calls(&response.tool_calls));
            let event = ProgressEvent::progress(job_id, narration);
            if let Err(e) = self.progress.publish(channel_id, &event).await {
                warn!(error = %e, "progress publish failed");
            }

            turns.push(Turn::assistant(
                response.text.unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                match self.dispatch_tool(channel_id, call, abort).await? {
                    Some(result) => {
                        turns.push(Turn::tool_result(call.id.clone(), result));
                    }
                    None => {
                        // Aborted mid-tool; the worker job was cancelled.
                        return Ok(None);
                    }
                }
            }
        }

        Err(NodeError::Invalid(format!("no convergence after {MAX_ITERATIONS} iterations")))
    }

    /// Either a local registry hit or a delegated worker job.
    /// `Ok(None)` means the run was aborted while the tool was in flight.
    async fn dispatch_tool(
        &self,
        channel_id: &str,
        call: &ToolCall,
        abort: &CancellationToken,
    ) -> Result<Option<String>, NodeError> {
        if let Some(tool) = self.tools.get(&call.name) {
            debug!(tool = %call.name, "local tool");
            return match tool.call(call.arguments.clone(), channel_id).await {
                Ok(result) => Ok(Some(result)),
                // Tool misuse feeds back into the loop as a result.
                Err(NodeError::Invalid(reason)) => Ok(Some(format!("tool error: {reason}"))),
                Err(other) => Err(other),
            };
        }

        let payload = JobPayload::ToolExecution {
            channel_id: channel_id.to_string(),
            tool: call.name.clone(),
            input: call.arguments.clone(),
            env: Default::default(),
            denied_commands: vec![],
            timeout_ms: None,
        };
        // The dispatcher decides whether this routes as a command tool or a
        // skill bundle, and injects vault secrets into the job env.
        match self.dispatcher.dispatch_and_wait(channel_id, payload, abort).await? {
            DelegatedResult::Completed(result) => Ok(Some(result)),
            DelegatedResult::Failed(error) => Ok(Some(format!("tool failed: {error}"))),
            DelegatedResult::TimedOut => {
                Ok(Some(format!("tool '{}' timed out", call.name)))
            }
            DelegatedResult::Aborted => Ok(None),
        }
    }

    /// Abort token or consumed cancel flag.
    async fn should_stop(&self, job_id: &str, abort: &CancellationToken) -> bool {
        if abort.is_cancelled() {
            return true;
        }
        match self.cancel.consume_flag(job_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(error = %e, "cancel flag check failed");
                false
            }
        }
    }

    /// Persist the assistant turn and queue async memory extraction.
    pub async fn record_exchange(
        &self,
        channel_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), NodeError> {
        self.store.append(channel_id, Role::Assistant, assistant_text, None).await?;
        let extraction = JobPayload::MemoryExtraction {
            channel_id: channel_id.to_string(),
            user_text: user_text.to_string(),
            assistant_text: assistant_text.to_string(),
        };
        self.dispatcher.enqueue(JobSpec::new(extraction)).await?;
        Ok(())
    }
}

fn describe_calls(calls: &[ToolCall]) -> String {
    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    format!("running {}", names.join(", "))
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
