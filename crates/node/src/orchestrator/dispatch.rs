// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production dispatcher: tool/skill jobs onto the tools queue, awaited
//! over the shared progress-waiter registry.

use async_trait::async_trait;
use sc_broker::{Broker, CancelBus, ProgressBus};
use sc_core::job::{JobPayload, JobSpec};
use sc_core::ProgressKind;
use sc_vault::Vault;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::NodeError;
use crate::traits::{DelegatedResult, JobDispatcher};
use crate::waiters::{wait_terminal, ProgressWaiters};

/// How long a delegated tool job may take before the loop gives up on it.
const TOOL_WAIT: Duration = Duration::from_secs(600);

pub struct WorkerDispatcher {
    pub broker: Broker,
    pub cancel: CancelBus,
    pub progress: ProgressBus,
    pub waiters: ProgressWaiters,
    pub vault: Arc<Vault>,
    pub skills_dir: PathBuf,
    pub denied_commands: Vec<String>,
}

impl WorkerDispatcher {
    /// Route a generic tool payload: `execute_command` stays a tool job,
    /// a name matching an on-disk skill bundle becomes a skill job, and
    /// both get vault secrets injected (workers never read the keyfile).
    async fn route(&self, payload: JobPayload) -> Result<Option<JobPayload>, NodeError> {
        let JobPayload::ToolExecution { channel_id, tool, input, timeout_ms, .. } = payload
        else {
            return Ok(Some(payload));
        };

        if tool == "execute_command" {
            return Ok(Some(JobPayload::ToolExecution {
                channel_id,
                tool,
                input,
                env: self.secrets_env().await,
                denied_commands: self.denied_commands.clone(),
                timeout_ms,
            }));
        }

        if self.skills_dir.join(&tool).join("skill.json").exists() {
            return Ok(Some(JobPayload::SkillExecution {
                channel_id,
                skill_id: tool,
                input,
                env: self.secrets_env().await,
                timeout_ms,
            }));
        }

        Ok(None)
    }

    async fn secrets_env(&self) -> BTreeMap<String, String> {
        match self.vault.resolve_all().await {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "vault bulk resolve failed, delegating without secrets");
                BTreeMap::new()
            }
        }
    }
}

#[async_trait]
impl JobDispatcher for WorkerDispatcher {
    async fn dispatch_and_wait(
        &self,
        channel_id: &str,
        payload: JobPayload,
        abort: &CancellationToken,
    ) -> Result<DelegatedResult, NodeError> {
        let Some(routed) = self.route(payload).await? else {
            return Ok(DelegatedResult::Failed("unknown tool".into()));
        };

        let enqueued = self.broker.enqueue(JobSpec::new(routed)).await?;
        let tool_job_id = enqueued.id().to_string();
        self.cancel.track_job(channel_id, &tool_job_id).await?;
        debug!(tool_job = %tool_job_id, "delegated to workers");

        let waited = tokio::select! {
            event = wait_terminal(&self.waiters, &self.progress, channel_id, &tool_job_id, TOOL_WAIT) => event,
            _ = abort.cancelled() => {
                // Cancel the outstanding worker job before exiting.
                if let Err(e) = self.cancel.request_job_cancel(&tool_job_id).await {
                    warn!(tool_job = %tool_job_id, error = %e, "tool cancel failed");
                }
                let _ = self.cancel.untrack_job(channel_id, &tool_job_id).await;
                return Ok(DelegatedResult::Aborted);
            }
        };
        let _ = self.cancel.untrack_job(channel_id, &tool_job_id).await;

        Ok(match waited {
            Some(event) if event.kind == ProgressKind::Complete => {
                DelegatedResult::Completed(event.result.unwrap_or_default())
            }
            Some(event) => DelegatedResult::Failed(
                event.error.unwrap_or_else(|| "unknown error".into()),
            ),
            None => DelegatedResult::TimedOut,
        })
    }

    async fn enqueue(&self, spec: JobSpec) -> Result<String, NodeError> {
        Ok(self.broker.enqueue(spec).await?.id().to_string())
    }
}
