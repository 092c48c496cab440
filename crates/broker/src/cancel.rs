// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancel bus: cross-process abort via pub/sub, short-TTL flags for pollers,
//! and SIGTERM→SIGKILL escalation for registered subprocess PIDs.

use futures_util::StreamExt;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace::{self, CANCEL_FLAG_TTL_SECS, PID_TTL_SECS};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BrokerError;

/// Grace between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(3);

/// Process-local abort state: job id → token, job id → subprocess pid.
///
/// Every process that runs cancellable work keeps one registry and one
/// cancel-bus subscriber; tokens registered here are aborted when a cancel
/// signal for their job id arrives from any process.
#[derive(Clone, Default)]
pub struct AbortRegistry {
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
    pids: Arc<Mutex<HashMap<String, u32>>>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for a job. Replaces any previous registration.
    pub fn register(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(job_id.to_string(), token.clone());
        token
    }

    pub fn unregister(&self, job_id: &str) {
        self.tokens.lock().remove(job_id);
        self.pids.lock().remove(job_id);
    }

    /// Abort a local token if present; returns whether one was found.
    pub fn abort(&self, job_id: &str) -> bool {
        if let Some(token) = self.tokens.lock().remove(job_id) {
            token.cancel();
            return true;
        }
        false
    }

    pub fn register_pid(&self, job_id: &str, pid: u32) {
        self.pids.lock().insert(job_id.to_string(), pid);
    }

    pub fn clear_pid(&self, job_id: &str) {
        self.pids.lock().remove(job_id);
    }

    pub fn pid(&self, job_id: &str) -> Option<u32> {
        self.pids.lock().get(job_id).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }
}

#[derive(Clone)]
pub struct CancelBus {
    conn: ConnectionManager,
    client: redis::Client,
    registry: AbortRegistry,
}

impl CancelBus {
    pub fn new(conn: ConnectionManager, client: redis::Client, registry: AbortRegistry) -> Self {
        Self { conn, client, registry }
    }

    pub fn registry(&self) -> &AbortRegistry {
        &self.registry
    }

    /// Broadcast cancellation of the given job ids to every process.
    pub async fn publish_cancel(&self, job_ids: &[String]) -> Result<(), BrokerError> {
        if job_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(job_ids)?;
        conn.publish::<_, _, ()>(keyspace::CANCEL_CHANNEL, payload).await?;
        info!(count = job_ids.len(), "cancel published");
        Ok(())
    }

    /// Cancel one job everywhere: pub/sub for subscribed processes, a
    /// short-TTL flag for pollers between abort boundaries, and a kill of
    /// the locally registered PID if any.
    pub async fn request_job_cancel(&self, job_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(
            keyspace::job_cancel_key(job_id),
            1,
            CANCEL_FLAG_TTL_SECS,
        )
        .await?;
        self.publish_cancel(&[job_id.to_string()]).await?;
        self.kill_registered(job_id);
        Ok(())
    }

    /// Cancel every tracked job for a channel.
    pub async fn cancel_all_for_channel(&self, channel_id: &str) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let key = keyspace::channel_jobs_key(channel_id);
        let job_ids: Vec<String> = conn.smembers(&key).await?;
        for job_id in &job_ids {
            self.request_job_cancel(job_id).await?;
        }
        conn.del::<_, ()>(&key).await?;
        Ok(job_ids.len())
    }

    /// Track an in-flight job against its channel for `cancel_all`.
    pub async fn track_job(&self, channel_id: &str, job_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(keyspace::channel_jobs_key(channel_id), job_id).await?;
        Ok(())
    }

    pub async fn untrack_job(&self, channel_id: &str, job_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(keyspace::channel_jobs_key(channel_id), job_id).await?;
        Ok(())
    }

    /// Consume the per-job cancel flag (or the global one). One observer
    /// wins; the flag clears on read.
    pub async fn consume_cancel_flag(&self, job_id: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let per_job: Option<String> = conn.get_del(keyspace::job_cancel_key(job_id)).await?;
        if per_job.is_some() {
            return Ok(true);
        }
        let global: Option<String> = conn.get_del(keyspace::cancel_flag_key()).await?;
        Ok(global.is_some())
    }

    /// Publish this process's PID for a running subprocess, so dashboards
    /// can surface it; the kill itself happens process-locally.
    pub async fn publish_pid(&self, job_id: &str, pid: u32) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(keyspace::job_pid_key(job_id), pid, PID_TTL_SECS).await?;
        self.registry.register_pid(job_id, pid);
        Ok(())
    }

    pub async fn clear_pid(&self, job_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keyspace::job_pid_key(job_id)).await?;
        self.registry.clear_pid(job_id);
        Ok(())
    }

    /// Run the cancel-signal subscriber until shutdown. On each received id:
    /// abort the local token, kill the local PID.
    pub async fn run_subscriber(&self, shutdown: CancellationToken) -> Result<(), BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(keyspace::CANCEL_CHANNEL).await?;
        let mut stream = pubsub.into_on_message();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = stream.next() => {
                    let Some(msg) = msg else { break };
                    let Ok(payload) = msg.get_payload::<String>() else { continue };
                    let Ok(job_ids) = serde_json::from_str::<Vec<String>>(&payload) else {
                        continue;
                    };
                    for job_id in job_ids {
                        let aborted = self.registry.abort(&job_id);
                        debug!(job = %job_id, aborted, "cancel signal received");
                        self.kill_registered(&job_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// SIGTERM the registered PID, then SIGKILL after the grace window if
    /// it is still alive. Best-effort: errors are logged, never surfaced.
    fn kill_registered(&self, job_id: &str) {
        let Some(pid) = self.registry.pid(job_id) else { return };
        let target = Pid::from_raw(pid as i32);
        if let Err(e) = kill(target, Signal::SIGTERM) {
            warn!(job = job_id, pid, error = %e, "SIGTERM failed");
            return;
        }
        info!(job = job_id, pid, "SIGTERM sent");
        let registry = self.registry.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            // Signal 0 probes liveness without sending anything.
            if kill(target, None).is_ok() {
                if let Err(e) = kill(target, Signal::SIGKILL) {
                    warn!(job = %job_id, pid, error = %e, "SIGKILL failed");
                } else {
                    info!(job = %job_id, pid, "SIGKILL sent after grace");
                }
            }
            registry.clear_pid(&job_id);
        });
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
