// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tools-queue handler: command execution and skill runs.

use async_trait::async_trait;
use sc_broker::{CancelBus, HandlerError, JobHandler, ProgressBus};
use sc_core::job::{JobPayload, JobRecord};
use sc_core::ProgressEvent;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::rewrite_stdout;
use crate::error::WorkerError;
use crate::exec::{spawn_process, ExecSpec, DEFAULT_TIMEOUT_MS};
use crate::install::Installer;
use crate::skills::SkillCache;

pub struct ToolsHandler {
    workspace: PathBuf,
    process_id: String,
    skills: Arc<SkillCache>,
    installer: Installer,
    cancel: CancelBus,
    progress: ProgressBus,
}

impl ToolsHandler {
    pub fn new(
        workspace: PathBuf,
        process_id: String,
        skills: Arc<SkillCache>,
        cancel: CancelBus,
        progress: ProgressBus,
    ) -> Self {
        Self {
            workspace,
            process_id,
            skills,
            installer: Installer::new(),
            cancel,
            progress,
        }
    }

    async fn run_tool(
        &self,
        job_id: &str,
        tool: &str,
        input: &Value,
        env: &BTreeMap<String, String>,
        denied_commands: &[String],
        timeout_ms: Option<u64>,
    ) -> Result<Value, WorkerError> {
        match tool {
            "execute_command" => {
                let command = input
                    .get("command")
                    .and_then(Value::as_str)
                    .ok_or_else(|| WorkerError::Bundle("execute_command needs a command".into()))?;

                if let Some(pattern) = match_denied(command, denied_commands) {
                    warn!(job = job_id, pattern, "command denied");
                    return Ok(json!({
                        "error": format!("command denied by policy: matches '{pattern}'"),
                    }));
                }

                let spec = ExecSpec::shell(command, &self.workspace)
                    .env(self.job_env(env))
                    .timeout_ms(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
                let outcome = self.supervise(job_id, spec).await?;
                Ok(serde_json::to_value(&outcome)?)
            }
            other => Err(WorkerError::Bundle(format!("unknown tool '{other}'"))),
        }
    }

    async fn run_skill(
        &self,
        job_id: &str,
        skill_id: &str,
        input: &Value,
        env: &BTreeMap<String, String>,
        timeout_ms: Option<u64>,
    ) -> Result<Value, WorkerError> {
        let skill = self.skills.get(skill_id).await?;
        self.installer
            .ensure_installed(
                skill_id,
                &skill.dir,
                skill.manifest.install.as_deref(),
                skill.manifest.language,
            )
            .await?;

        let timeout = timeout_ms
            .or(skill.manifest.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let spec = ExecSpec::shell(&skill.manifest.command, &skill.dir)
            .env(self.job_env(env))
            .timeout_ms(timeout)
            .stdin(input.to_string());
        let outcome = self.supervise(job_id, spec).await?;

        if outcome.exit_code != 0 {
            // A failed skill run is still a packaged result.
            return Ok(serde_json::to_value(&outcome)?);
        }

        let rewritten = rewrite_stdout(&outcome.stdout, &self.workspace, &self.process_id);
        Ok(serde_json::from_str(&rewritten).unwrap_or_else(|_| json!({ "output": rewritten })))
    }

    /// Spawn with abort wiring: the job's token aborts the child, the PID is
    /// published for cross-process kill, both are cleaned up after.
    async fn supervise(
        &self,
        job_id: &str,
        spec: ExecSpec,
    ) -> Result<crate::exec::ExecOutcome, WorkerError> {
        let token = self.cancel.registry().register(job_id);

        let bus = self.cancel.clone();
        let pid_job = job_id.to_string();
        let outcome = spawn_process(spec, &token, move |pid| {
            bus.registry().register_pid(&pid_job, pid);
            tokio::spawn(async move {
                if let Err(e) = bus.publish_pid(&pid_job, pid).await {
                    warn!(job = %pid_job, error = %e, "pid publish failed");
                }
            });
        })
        .await;

        let cleanup = self.cancel.clone();
        let job = job_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = cleanup.clear_pid(&job).await {
                warn!(job = %job, error = %e, "pid cleanup failed");
            }
        });
        self.cancel.registry().unregister(job_id);
        outcome
    }

    /// Job env: payload secrets plus the workspace pointer.
    fn job_env(&self, payload_env: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut env = payload_env.clone();
        env.insert("WORKSPACE_DIR".into(), self.workspace.to_string_lossy().into_owned());
        env
    }
}

#[async_trait]
impl JobHandler for ToolsHandler {
    async fn handle(&self, job: JobRecord) -> Result<Option<Value>, HandlerError> {
        let job_id = job.id.as_str().to_string();

        // A cancel issued while the job sat in the queue consumes here.
        match self.cancel.consume_cancel_flag(&job_id).await {
            Ok(true) => {
                info!(job = %job_id, "job cancelled before start");
                return Ok(None);
            }
            Ok(false) => {}
            Err(e) => warn!(job = %job_id, error = %e, "cancel flag check failed"),
        }

        let (channel_id, result) = match &job.payload {
            JobPayload::ToolExecution {
                channel_id,
                tool,
                input,
                env,
                denied_commands,
                timeout_ms,
            } => (
                channel_id.clone(),
                self.run_tool(&job_id, tool, input, env, denied_commands, *timeout_ms).await,
            ),
            JobPayload::SkillExecution { channel_id, skill_id, input, env, timeout_ms } => (
                channel_id.clone(),
                self.run_skill(&job_id, skill_id, input, env, *timeout_ms).await,
            ),
            other => {
                return Err(HandlerError::fatal(format!(
                    "tools queue received unroutable job '{}'",
                    other.name()
                )));
            }
        };

        match result {
            Ok(value) => {
                let event = ProgressEvent::complete(&job_id, value.to_string());
                if let Err(e) = self.progress.publish(&channel_id, &event).await {
                    warn!(job = %job_id, error = %e, "progress publish failed");
                }
                Ok(Some(value))
            }
            Err(err) => {
                // Emit the terminal error event only when retries are spent.
                if job.attempts_made >= job.attempts {
                    let event = ProgressEvent::error(&job_id, err.to_string());
                    if let Err(e) = self.progress.publish(&channel_id, &event).await {
                        warn!(job = %job_id, error = %e, "progress publish failed");
                    }
                }
                let retryable = !matches!(
                    err,
                    WorkerError::RuntimeMissing(_) | WorkerError::Path(_)
                );
                Err(HandlerError { message: err.to_string(), retryable })
            }
        }
    }
}

/// Post-pattern denylist match: the command is checked after normalization,
/// not before shell parsing, so aliases of the padded form still match.
fn match_denied<'a>(command: &str, denied: &'a [String]) -> Option<&'a str> {
    let normalized: String = command.split_whitespace().collect::<Vec<_>>().join(" ");
    denied
        .iter()
        .find(|pattern| {
            let p: String = pattern.split_whitespace().collect::<Vec<_>>().join(" ");
            !p.is_empty() && normalized.contains(&p)
        })
        .map(String::as_str)
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
