// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message pipeline: guards, persistence, typing indicators, the
//! orchestrator, and exactly one terminal progress event per job (none
//! after an abort).

use sc_core::ProgressEvent;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::NodeError;
use crate::guards::{prompts, Guards};
use crate::orchestrator::Orchestrator;
use crate::traits::{CancelOps, MessageStore, ProgressPublish, Role};

/// Typing indicator cadence while the orchestrator runs.
const TYPING_INTERVAL: Duration = Duration::from_secs(5);

pub struct Processor {
    pub guards: Arc<Guards>,
    pub store: Arc<dyn MessageStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub progress: Arc<dyn ProgressPublish>,
    pub cancel: Arc<dyn CancelOps>,
}

impl Processor {
    /// Process one inbound message job end to end.
    pub async fn process_message(
        &self,
        job_id: &str,
        channel_id: &str,
        text: &str,
        attachments: &[String],
    ) -> Result<(), NodeError> {
        let full_text = with_attachment_summary(text, attachments);

        // Inbound guard. A block is persisted and answered with the canned
        // rejection; it is not an error.
        let verdict = self.guards.inbound(&full_text).await;
        if !verdict.passed {
            let reason = verdict.reason.as_deref().unwrap_or("blocked");
            self.store.append(channel_id, Role::User, &full_text, Some(reason)).await?;
            self.publish(channel_id, ProgressEvent::complete(job_id, prompts::INBOUND_REJECTION))
                .await;
            return Ok(());
        }

        // A cancel issued while the job was queued consumes here.
        if self.cancel.consume_flag(job_id).await? {
            info!(job = job_id, "message cancelled before processing");
            return Ok(());
        }

        self.store.append(channel_id, Role::User, &full_text, None).await?;

        let abort = self.cancel.register_abort(job_id);
        if let Err(e) = self.cancel.track(channel_id, job_id).await {
            warn!(job = job_id, error = %e, "job tracking failed");
        }
        let typing = self.spawn_typing_loop(channel_id, job_id);

        let outcome = self
            .orchestrator
            .run(channel_id, job_id, &full_text, &abort)
            .await;

        typing.abort();
        self.cancel.unregister_abort(job_id);
        let _ = self.cancel.untrack(channel_id, job_id).await;

        match outcome {
            Ok(Some(response)) => {
                let verdict = self.guards.outbound(&response).await;
                if verdict.passed {
                    if let Err(e) =
                        self.orchestrator.record_exchange(channel_id, &full_text, &response).await
                    {
                        warn!(job = job_id, error = %e, "exchange persistence failed");
                    }
                    self.publish(channel_id, ProgressEvent::complete(job_id, response)).await;
                } else {
                    // The guard replaces, never surfaces, a bad response.
                    self.store
                        .append(channel_id, Role::Assistant, prompts::OUTBOUND_FALLBACK, None)
                        .await?;
                    self.publish(
                        channel_id,
                        ProgressEvent::complete(job_id, prompts::OUTBOUND_FALLBACK),
                    )
                    .await;
                }
                Ok(())
            }
            Ok(None) => {
                // Cancelled: no terminal event; the waiter times out.
                info!(job = job_id, "no terminal event after cancellation");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Chat commands ride the same queue at higher priority.
    pub async fn process_command(
        &self,
        job_id: &str,
        channel_id: &str,
        command: &str,
        status_line: Option<String>,
    ) -> Result<(), NodeError> {
        let reply = match command {
            "/start" => {
                "Hi! I'm ScalyClaw. Send me a message, or /help for commands.".to_string()
            }
            "/help" => "Commands: /start, /help, /status, /stop".to_string(),
            "/status" => status_line.unwrap_or_else(|| "status unavailable".to_string()),
            "/stop" => {
                let cancelled = self.cancel.cancel_all(channel_id).await?;
                format!("Stopped {cancelled} running job(s).")
            }
            other => format!("Unknown command '{other}'. Try /help."),
        };
        self.publish(channel_id, ProgressEvent::complete(job_id, reply)).await;
        Ok(())
    }

    fn spawn_typing_loop(&self, channel_id: &str, job_id: &str) -> tokio::task::JoinHandle<()> {
        let progress = Arc::clone(&self.progress);
        let channel_id = channel_id.to_string();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            loop {
                if progress
                    .publish(&channel_id, &ProgressEvent::typing(&job_id))
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(TYPING_INTERVAL).await;
            }
        })
    }

    async fn publish(&self, channel_id: &str, event: ProgressEvent) {
        if let Err(e) = self.progress.publish(channel_id, &event).await {
            warn!(channel = channel_id, error = %e, "terminal publish failed");
        }
    }
}

/// One line per attachment, appended below the message text.
fn with_attachment_summary(text: &str, attachments: &[String]) -> String {
    if attachments.is_empty() {
        return text.to_string();
    }
    let mut out = text.to_string();
    for attachment in attachments {
        out.push_str("\n[attachment] ");
        out.push_str(attachment);
    }
    out
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
