// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job names, queue routing, payloads, and the stored job record.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The six broker queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Messages,
    Agents,
    Tools,
    Proactive,
    Scheduler,
    System,
}

impl QueueName {
    pub const ALL: [QueueName; 6] = [
        QueueName::Messages,
        QueueName::Agents,
        QueueName::Tools,
        QueueName::Proactive,
        QueueName::Scheduler,
        QueueName::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Messages => "messages",
            QueueName::Agents => "agents",
            QueueName::Tools => "tools",
            QueueName::Proactive => "proactive",
            QueueName::Scheduler => "scheduler",
            QueueName::System => "system",
        }
    }
}

crate::simple_display! {
    QueueName {
        Messages => "messages",
        Agents => "agents",
        Tools => "tools",
        Proactive => "proactive",
        Scheduler => "scheduler",
        System => "system",
    }
}

/// Discriminator for every job the broker routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobName {
    MessageProcessing,
    Command,
    AgentTask,
    ToolExecution,
    SkillExecution,
    ProactiveCheck,
    Reminder,
    RecurrentReminder,
    Task,
    RecurrentTask,
    MemoryExtraction,
    ScheduledFire,
    ProactiveFire,
    VaultKeyRotation,
}

impl JobName {
    pub const ALL: [JobName; 14] = [
        JobName::MessageProcessing,
        JobName::Command,
        JobName::AgentTask,
        JobName::ToolExecution,
        JobName::SkillExecution,
        JobName::ProactiveCheck,
        JobName::Reminder,
        JobName::RecurrentReminder,
        JobName::Task,
        JobName::RecurrentTask,
        JobName::MemoryExtraction,
        JobName::ScheduledFire,
        JobName::ProactiveFire,
        JobName::VaultKeyRotation,
    ];

    /// The queue a job with this name is routed to. Total by construction.
    pub fn queue(&self) -> QueueName {
        match self {
            JobName::MessageProcessing | JobName::Command => QueueName::Messages,
            JobName::AgentTask => QueueName::Agents,
            JobName::ToolExecution | JobName::SkillExecution => QueueName::Tools,
            JobName::ProactiveCheck => QueueName::Proactive,
            JobName::Reminder
            | JobName::RecurrentReminder
            | JobName::Task
            | JobName::RecurrentTask => QueueName::Scheduler,
            JobName::MemoryExtraction
            | JobName::ScheduledFire
            | JobName::ProactiveFire
            | JobName::VaultKeyRotation => QueueName::System,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::MessageProcessing => "message-processing",
            JobName::Command => "command",
            JobName::AgentTask => "agent-task",
            JobName::ToolExecution => "tool-execution",
            JobName::SkillExecution => "skill-execution",
            JobName::ProactiveCheck => "proactive-check",
            JobName::Reminder => "reminder",
            JobName::RecurrentReminder => "recurrent-reminder",
            JobName::Task => "task",
            JobName::RecurrentTask => "recurrent-task",
            JobName::MemoryExtraction => "memory-extraction",
            JobName::ScheduledFire => "scheduled-fire",
            JobName::ProactiveFire => "proactive-fire",
            JobName::VaultKeyRotation => "vault-key-rotation",
        }
    }
}

impl std::fmt::Display for JobName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of scheduled entity a `scheduled-fire` job delivers for.
/// Mirrors [`crate::schedule::ScheduledJobKind`] on the wire.
pub type FireKind = crate::schedule::ScheduledJobKind;

/// Typed job payload, tagged by job name on the wire.
///
/// Unknown tags are rejected at deserialization; a payload can never be
/// routed to a queue its name does not map to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum JobPayload {
    MessageProcessing {
        channel_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
    },
    Command {
        channel_id: String,
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
    AgentTask {
        channel_id: String,
        agent: String,
        task: String,
    },
    ToolExecution {
        channel_id: String,
        tool: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        denied_commands: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    SkillExecution {
        channel_id: String,
        skill_id: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    ProactiveCheck {
        channel_id: String,
    },
    Reminder {
        scheduled_job_id: Uuid,
    },
    RecurrentReminder {
        scheduled_job_id: Uuid,
    },
    Task {
        scheduled_job_id: Uuid,
    },
    RecurrentTask {
        scheduled_job_id: Uuid,
    },
    MemoryExtraction {
        channel_id: String,
        user_text: String,
        assistant_text: String,
    },
    ScheduledFire {
        channel_id: String,
        kind: FireKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        scheduled_job_id: Uuid,
    },
    ProactiveFire {
        channel_id: String,
    },
    VaultKeyRotation {},
}

impl JobPayload {
    pub fn name(&self) -> JobName {
        match self {
            JobPayload::MessageProcessing { .. } => JobName::MessageProcessing,
            JobPayload::Command { .. } => JobName::Command,
            JobPayload::AgentTask { .. } => JobName::AgentTask,
            JobPayload::ToolExecution { .. } => JobName::ToolExecution,
            JobPayload::SkillExecution { .. } => JobName::SkillExecution,
            JobPayload::ProactiveCheck { .. } => JobName::ProactiveCheck,
            JobPayload::Reminder { .. } => JobName::Reminder,
            JobPayload::RecurrentReminder { .. } => JobName::RecurrentReminder,
            JobPayload::Task { .. } => JobName::Task,
            JobPayload::RecurrentTask { .. } => JobName::RecurrentTask,
            JobPayload::MemoryExtraction { .. } => JobName::MemoryExtraction,
            JobPayload::ScheduledFire { .. } => JobName::ScheduledFire,
            JobPayload::ProactiveFire { .. } => JobName::ProactiveFire,
            JobPayload::VaultKeyRotation {} => JobName::VaultKeyRotation,
        }
    }

    /// The channel this payload reports progress to, when it has one.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            JobPayload::MessageProcessing { channel_id, .. }
            | JobPayload::Command { channel_id, .. }
            | JobPayload::AgentTask { channel_id, .. }
            | JobPayload::ToolExecution { channel_id, .. }
            | JobPayload::SkillExecution { channel_id, .. }
            | JobPayload::ProactiveCheck { channel_id }
            | JobPayload::MemoryExtraction { channel_id, .. }
            | JobPayload::ScheduledFire { channel_id, .. }
            | JobPayload::ProactiveFire { channel_id } => Some(channel_id),
            JobPayload::Reminder { .. }
            | JobPayload::RecurrentReminder { .. }
            | JobPayload::Task { .. }
            | JobPayload::RecurrentTask { .. }
            | JobPayload::VaultKeyRotation {} => None,
        }
    }
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backoff {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

impl Backoff {
    pub fn exponential(delay_ms: u64) -> Self {
        Self { kind: BackoffKind::Exponential, delay_ms }
    }

    pub fn fixed(delay_ms: u64) -> Self {
        Self { kind: BackoffKind::Fixed, delay_ms }
    }

    /// Delay before the next attempt, given attempts already made (≥ 1).
    pub fn delay_for(&self, attempts_made: u32) -> u64 {
        match self.kind {
            BackoffKind::Fixed => self.delay_ms,
            BackoffKind::Exponential => {
                let shift = attempts_made.saturating_sub(1).min(16);
                self.delay_ms.saturating_mul(1u64 << shift)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(2_000)
    }
}

/// Repeat schedule for a repeatable job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Repeat {
    Every {
        #[serde(rename = "everyMs")]
        every_ms: u64,
    },
    Cron {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

/// A request to enqueue work, before the broker assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub payload: JobPayload,
    #[serde(default)]
    pub priority: i32,
    pub attempts: u32,
    pub backoff: Backoff,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Repeat>,
    /// Client-chosen id for repeatable jobs; upserted, never duplicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
}

impl JobSpec {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            payload,
            priority: 0,
            attempts: 3,
            backoff: Backoff::default(),
            delay_ms: 0,
            repeat: None,
            stable_id: None,
        }
    }

    pub fn name(&self) -> JobName {
        self.payload.name()
    }

    /// Deterministically derived from the job name.
    pub fn queue(&self) -> QueueName {
        self.name().queue()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Make the spec repeatable under a stable client-chosen id.
    pub fn repeat(mut self, stable_id: impl Into<String>, repeat: Repeat) -> Self {
        self.stable_id = Some(stable_id.into());
        self.repeat = Some(repeat);
        self
    }
}

/// Lifecycle state of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Prioritized,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

crate::simple_display! {
    JobState {
        Waiting => "waiting",
        Prioritized => "prioritized",
        Delayed => "delayed",
        Active => "active",
        Completed => "completed",
        Failed => "failed",
    }
}

/// A job as stored in the queue's data hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub payload: JobPayload,
    pub priority: i32,
    pub attempts: u32,
    #[serde(default)]
    pub attempts_made: u32,
    pub backoff: Backoff,
    pub created_at_ms: u64,
    /// Earliest time the job may run (> created_at_ms when delayed).
    pub run_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<serde_json::Value>,
}

impl JobRecord {
    pub fn from_spec(spec: &JobSpec, id: JobId, now_ms: u64) -> Self {
        Self {
            id,
            payload: spec.payload.clone(),
            priority: spec.priority,
            attempts: spec.attempts,
            attempts_made: 0,
            backoff: spec.backoff,
            created_at_ms: now_ms,
            run_at_ms: now_ms + spec.delay_ms,
            finished_at_ms: None,
            state: if spec.delay_ms > 0 {
                JobState::Delayed
            } else if spec.priority > 0 {
                JobState::Prioritized
            } else {
                JobState::Waiting
            },
            last_error: None,
            return_value: None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
