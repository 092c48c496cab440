// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress waiters: one shared `progress:*` subscriber demultiplexed to
//! per-waiter oneshots keyed `{channelId}:{jobId}`.
//!
//! The chat API, the WebSocket handler, and the orchestrator's delegated
//! tool calls all wait on terminal events through this registry.

use parking_lot::Mutex;
use sc_broker::ProgressBus;
use sc_core::ProgressEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use futures_util::StreamExt;

#[derive(Clone, Default)]
pub struct ProgressWaiters {
    inner: Arc<Mutex<HashMap<(String, String), oneshot::Sender<ProgressEvent>>>>,
}

impl ProgressWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for the terminal event of `(channel, job)`.
    /// Replaces any previous waiter for the same key.
    pub fn register(&self, channel_id: &str, job_id: &str) -> oneshot::Receiver<ProgressEvent> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .insert((channel_id.to_string(), job_id.to_string()), tx);
        rx
    }

    pub fn unregister(&self, channel_id: &str, job_id: &str) {
        self.inner
            .lock()
            .remove(&(channel_id.to_string(), job_id.to_string()));
    }

    /// Resolve a waiter with a terminal event; non-terminal events are
    /// ignored here (streaming consumers watch the bus directly).
    pub fn resolve(&self, channel_id: &str, event: &ProgressEvent) {
        if !event.is_terminal() {
            return;
        }
        let key = (channel_id.to_string(), event.job_id.clone());
        if let Some(tx) = self.inner.lock().remove(&key) {
            let _ = tx.send(event.clone());
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// The single long-lived receive loop. Runs for the life of the process;
/// reconnects with backoff if the subscription drops.
pub async fn run_pump(bus: ProgressBus, waiters: ProgressWaiters, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let mut stream = match bus.subscribe_pattern().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "progress subscription failed, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                item = stream.next() => {
                    match item {
                        Some((channel_id, event)) => {
                            debug!(channel = %channel_id, job = %event.job_id, kind = %event.kind, "pump");
                            waiters.resolve(&channel_id, &event);
                        }
                        None => break, // connection lost; resubscribe
                    }
                }
            }
        }
    }
}

/// Wait for a job's terminal event with a deadline, falling back to the
/// buffered-responses store (covers events published before the waiter
/// registered or while a client was reconnecting).
pub async fn wait_terminal(
    waiters: &ProgressWaiters,
    bus: &ProgressBus,
    channel_id: &str,
    job_id: &str,
    timeout: Duration,
) -> Option<ProgressEvent> {
    let rx = waiters.register(channel_id, job_id);

    // The terminal event may already sit in the buffer.
    if let Ok(buffered) = bus.buffered(job_id).await {
        if let Some(event) = buffered.into_iter().rev().find(ProgressEvent::is_terminal) {
            waiters.unregister(channel_id, job_id);
            return Some(event);
        }
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(event)) => Some(event),
        _ => {
            waiters.unregister(channel_id, job_id);
            None
        }
    }
}

#[cfg(test)]
#[path = "waiters_tests.rs"]
mod tests;
