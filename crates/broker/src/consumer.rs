// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue consumer: poll loop, lease renewal, bounded handler concurrency.

use sc_core::clock::{Clock, SystemClock};
use sc_core::job::JobRecord;
use sc_core::keyspace::JOB_LOCK_MS;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::BrokerError;
use crate::queue::WorkQueue;

/// A handler failure. Handlers that observed a cancellation mid-flight
/// return `Ok(None)` instead; cancellation is not an error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    /// Retryable errors consume an attempt; fatal ones exhaust all attempts.
    pub retryable: bool,
}

impl HandlerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

/// A job handler for one queue. Must be idempotent: the broker delivers
/// at-least-once and redelivers on lease expiry.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: JobRecord) -> Result<Option<serde_json::Value>, HandlerError>;
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self { concurrency: 4, poll_interval: Duration::from_millis(500) }
    }
}

pub struct Consumer {
    queue: WorkQueue,
    handler: Arc<dyn JobHandler>,
    config: ConsumerConfig,
}

impl Consumer {
    pub fn new(queue: WorkQueue, handler: Arc<dyn JobHandler>, config: ConsumerConfig) -> Self {
        Self { queue, handler, config }
    }

    /// Run until `shutdown` fires. Each tick promotes due delayed jobs and
    /// repeatables, requeues stalled leases, then pops while permits allow.
    pub async fn run(self, shutdown: CancellationToken) {
        let clock = SystemClock;
        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        info!(
            queue = %self.queue.name(),
            concurrency = self.config.concurrency,
            "consumer started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let now_ms = clock.epoch_ms();
            if let Err(e) = self.tick(now_ms).await {
                warn!(queue = %self.queue.name(), error = %e, "maintenance tick failed");
            }

            while permits.available_permits() > 0 {
                match self.queue.pop(clock.epoch_ms()).await {
                    Ok(Some(job)) => {
                        let permit = match permits.clone().acquire_owned().await {
                            Ok(p) => p,
                            Err(_) => break,
                        };
                        let queue = self.queue.clone();
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            let _permit = permit;
                            run_job(queue, handler, job).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(queue = %self.queue.name(), error = %e, "pop failed");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        // Drain: wait for in-flight handlers to finish.
        let _ = permits.acquire_many(self.config.concurrency as u32).await;
        info!(queue = %self.queue.name(), "consumer stopped");
    }

    async fn tick(&self, now_ms: u64) -> Result<(), BrokerError> {
        self.queue.promote_due(now_ms).await?;
        self.queue.promote_repeats(now_ms).await?;
        self.queue.requeue_stalled(now_ms).await?;
        Ok(())
    }
}

/// Run one job: renew the lease at ⅓ cadence while the handler runs, then
/// complete or fail-with-backoff.
async fn run_job(queue: WorkQueue, handler: Arc<dyn JobHandler>, mut job: JobRecord) {
    let clock = SystemClock;
    let job_id = job.id;
    let renewal = CancellationToken::new();

    let renew_guard = renewal.clone();
    let renew_queue = queue.clone();
    let renew_task = tokio::spawn(async move {
        let interval = Duration::from_millis(JOB_LOCK_MS / 3);
        loop {
            tokio::select! {
                _ = renew_guard.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = renew_queue.renew_lease(&job_id, SystemClock.epoch_ms()).await {
                        warn!(job = %job_id, error = %e, "lease renewal failed");
                    }
                }
            }
        }
    });

    debug!(job = %job_id, name = %job.payload.name(), "handler starting");
    let result = handler.handle(job.clone()).await;
    renewal.cancel();
    let _ = renew_task.await;

    let now_ms = clock.epoch_ms();
    match result {
        Ok(value) => {
            if let Err(e) = queue.complete(&mut job, value, now_ms).await {
                error!(job = %job_id, error = %e, "failed to record completion");
            }
        }
        Err(err) => {
            if !err.retryable {
                // Burn the remaining budget so fail() moves it to failed.
                job.attempts_made = job.attempts;
            }
            if let Err(e) = queue.fail(&mut job, &err.message, now_ms).await {
                error!(job = %job_id, error = %e, "failed to record failure");
            }
        }
    }
}
