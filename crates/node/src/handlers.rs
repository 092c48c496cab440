// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue handlers run by the node's consumers.
//!
//! messages → the processor; scheduler → status-gated fires; system →
//! deliveries, memory extraction, vault rotation; agents → delegated
//! agent tasks; proactive → cooldown bookkeeping.

use async_trait::async_trait;
use sc_broker::{Broker, ChannelState, HandlerError, JobHandler, ProgressBus};
use sc_core::clock::{Clock, SystemClock};
use sc_core::job::{JobPayload, JobRecord};
use sc_core::ProgressEvent;
use sc_vault::Vault;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::NodeError;
use crate::orchestrator::Orchestrator;
use crate::processor::Processor;
use crate::scheduler::Scheduler;
use crate::traits::{ChannelSink, MemoryIndex};

fn to_handler_error(e: NodeError) -> HandlerError {
    HandlerError { message: e.to_string(), retryable: e.is_transient() }
}

/// Emit the terminal `error` event once a job has burned its last attempt.
async fn publish_error_if_final(progress: &ProgressBus, job: &JobRecord, message: &str) {
    if job.attempts_made < job.attempts {
        return;
    }
    let Some(channel_id) = job.payload.channel_id() else { return };
    let event = ProgressEvent::error(job.id.as_str(), message);
    if let Err(e) = progress.publish(channel_id, &event).await {
        warn!(job = %job.id, error = %e, "error event publish failed");
    }
}

// --- messages queue ---

pub struct MessagesHandler {
    pub processor: Arc<Processor>,
    pub broker: Broker,
    pub channels: ChannelState,
    pub progress: ProgressBus,
}

#[async_trait]
impl JobHandler for MessagesHandler {
    async fn handle(
        &self,
        job: JobRecord,
    ) -> Result<Option<serde_json::Value>, HandlerError> {
        let job_id = job.id.as_str().to_string();
        let result = match &job.payload {
            JobPayload::MessageProcessing { channel_id, text, attachments, .. } => {
                if let Err(e) =
                    self.channels.touch_activity(channel_id, SystemClock.epoch_ms()).await
                {
                    warn!(channel = %channel_id, error = %e, "activity stamp failed");
                }
                self.processor.process_message(&job_id, channel_id, text, attachments).await
            }
            JobPayload::Command { channel_id, command, .. } => {
                let status = if command == "/status" {
                    Some(self.status_line().await)
                } else {
                    None
                };
                self.processor.process_command(&job_id, channel_id, command, status).await
            }
            other => {
                return Err(HandlerError::fatal(format!(
                    "messages queue received unroutable job '{}'",
                    other.name()
                )));
            }
        };

        match result {
            Ok(()) => Ok(None),
            Err(e) => {
                publish_error_if_final(
                    &self.progress,
                    &job,
                    "Something went wrong while processing your message.",
                )
                .await;
                Err(to_handler_error(e))
            }
        }
    }
}

impl MessagesHandler {
    async fn status_line(&self) -> String {
        match self.broker.counts().await {
            Ok(counts) => {
                let mut parts: Vec<String> = counts
                    .iter()
                    .map(|(queue, c)| {
                        format!("{queue}: {} waiting, {} active", c.waiting, c.active)
                    })
                    .collect();
                parts.sort();
                parts.join(" | ")
            }
            Err(e) => format!("status unavailable: {e}"),
        }
    }
}

// --- scheduler queue ---

pub struct SchedulerFireHandler {
    pub scheduler: Arc<Scheduler>,
}

#[async_trait]
impl JobHandler for SchedulerFireHandler {
    async fn handle(
        &self,
        job: JobRecord,
    ) -> Result<Option<serde_json::Value>, HandlerError> {
        let scheduled_job_id = match &job.payload {
            JobPayload::Reminder { scheduled_job_id }
            | JobPayload::RecurrentReminder { scheduled_job_id }
            | JobPayload::Task { scheduled_job_id }
            | JobPayload::RecurrentTask { scheduled_job_id } => *scheduled_job_id,
            other => {
                return Err(HandlerError::fatal(format!(
                    "scheduler queue received unroutable job '{}'",
                    other.name()
                )));
            }
        };

        match self.scheduler.handle_fire(scheduled_job_id).await {
            Ok(()) => Ok(None),
            Err(e) => {
                if job.attempts_made >= job.attempts {
                    if let Err(mark) = self.scheduler.mark_failed(scheduled_job_id).await {
                        warn!(id = %scheduled_job_id, error = %mark, "failed-mark failed");
                    }
                }
                Err(to_handler_error(e))
            }
        }
    }
}

// --- system queue ---

pub struct SystemHandler {
    pub sink: Arc<dyn ChannelSink>,
    pub orchestrator: Arc<Orchestrator>,
    pub memory: Arc<dyn MemoryIndex>,
    pub vault: Arc<Vault>,
    pub progress: ProgressBus,
    pub channels: ChannelState,
}

#[async_trait]
impl JobHandler for SystemHandler {
    async fn handle(
        &self,
        job: JobRecord,
    ) -> Result<Option<serde_json::Value>, HandlerError> {
        let job_id = job.id.as_str().to_string();
        let result = match &job.payload {
            JobPayload::ScheduledFire { channel_id, kind, message, task, .. } => {
                if kind.is_task() {
                    self.deliver_task(&job_id, channel_id, task.as_deref().unwrap_or_default())
                        .await
                } else {
                    self.deliver_reminder(
                        &job_id,
                        channel_id,
                        message.as_deref().unwrap_or_default(),
                    )
                    .await
                }
            }
            JobPayload::MemoryExtraction { channel_id, user_text, assistant_text } => {
                self.memory.extract(channel_id, user_text, assistant_text).await
            }
            JobPayload::VaultKeyRotation {} => {
                self.vault.rotate().await.map(|rotated| {
                    info!(rotated, "vault rotation job complete");
                })
                .map_err(NodeError::from)
            }
            JobPayload::ProactiveFire { channel_id } => {
                // Engagement content is produced elsewhere; this re-arms the
                // cooldown window and counts the attempt.
                let _ = self.channels.arm_proactive_cooldown(channel_id, 3_600).await;
                let _ = self.channels.incr_proactive_daily(channel_id).await;
                Ok(())
            }
            other => {
                return Err(HandlerError::fatal(format!(
                    "system queue received unroutable job '{}'",
                    other.name()
                )));
            }
        };

        match result {
            Ok(()) => Ok(None),
            Err(e) => {
                publish_error_if_final(&self.progress, &job, &e.to_string()).await;
                Err(to_handler_error(e))
            }
        }
    }
}

impl SystemHandler {
    /// Reminders deliver the stored description directly.
    async fn deliver_reminder(
        &self,
        job_id: &str,
        channel_id: &str,
        message: &str,
    ) -> Result<(), NodeError> {
        let text = format!("Reminder: {message}");
        self.sink.send_text(channel_id, &text).await?;
        let event = ProgressEvent::complete(job_id, text);
        self.progress.publish(channel_id, &event).await?;
        Ok(())
    }

    /// Tasks run through the orchestrator as a synthesized user turn; only
    /// the final result is delivered.
    async fn deliver_task(
        &self,
        job_id: &str,
        channel_id: &str,
        task: &str,
    ) -> Result<(), NodeError> {
        let abort = CancellationToken::new();
        match self.orchestrator.run(channel_id, job_id, task, &abort).await? {
            Some(result) => {
                self.sink.send_text(channel_id, &result).await?;
                let event = ProgressEvent::complete(job_id, result);
                self.progress.publish(channel_id, &event).await?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

// --- agents queue ---

pub struct AgentsHandler {
    pub orchestrator: Arc<Orchestrator>,
    pub progress: ProgressBus,
}

#[async_trait]
impl JobHandler for AgentsHandler {
    async fn handle(
        &self,
        job: JobRecord,
    ) -> Result<Option<serde_json::Value>, HandlerError> {
        let job_id = job.id.as_str().to_string();
        let JobPayload::AgentTask { channel_id, agent, task } = &job.payload else {
            return Err(HandlerError::fatal(format!(
                "agents queue received unroutable job '{}'",
                job.payload.name()
            )));
        };

        let prompt = format!("[delegated to agent '{agent}'] {task}");
        let abort = CancellationToken::new();
        match self.orchestrator.run(channel_id, &job_id, &prompt, &abort).await {
            Ok(Some(result)) => {
                let event = ProgressEvent::complete(&job_id, result.clone());
                if let Err(e) = self.progress.publish(channel_id, &event).await {
                    warn!(job = %job_id, error = %e, "agent result publish failed");
                }
                Ok(Some(serde_json::Value::String(result)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                publish_error_if_final(&self.progress, &job, &e.to_string()).await;
                Err(to_handler_error(e))
            }
        }
    }
}

// --- proactive queue ---

pub struct ProactiveHandler {
    pub channels: ChannelState,
    pub broker: Broker,
}

#[async_trait]
impl JobHandler for ProactiveHandler {
    async fn handle(
        &self,
        job: JobRecord,
    ) -> Result<Option<serde_json::Value>, HandlerError> {
        let JobPayload::ProactiveCheck { channel_id } = &job.payload else {
            return Err(HandlerError::fatal(format!(
                "proactive queue received unroutable job '{}'",
                job.payload.name()
            )));
        };

        // Fire only when the channel has been quiet and the cooldown is
        // clear; the daily cap bounds total engagement.
        let armed = self
            .channels
            .arm_proactive_cooldown(channel_id, 3_600)
            .await
            .map_err(|e| HandlerError::transient(e.to_string()))?;
        if !armed {
            return Ok(None);
        }
        let today = self
            .channels
            .incr_proactive_daily(channel_id)
            .await
            .map_err(|e| HandlerError::transient(e.to_string()))?;
        if today > 3 {
            return Ok(None);
        }

        let fire = sc_core::job::JobSpec::new(JobPayload::ProactiveFire {
            channel_id: channel_id.clone(),
        });
        self.broker
            .enqueue(fire)
            .await
            .map_err(|e| HandlerError::transient(e.to_string()))?;
        Ok(None)
    }
}
