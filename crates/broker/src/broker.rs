// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-queue broker facade.
//!
//! Routing is derived from the job name; callers never pick a queue.

use redis::aio::ConnectionManager;
use sc_core::clock::{Clock, SystemClock};
use sc_core::job::{JobRecord, JobSpec, JobState, QueueName};
use sc_core::JobId;
use std::collections::HashMap;
use tracing::debug;

use crate::error::BrokerError;
use crate::queue::{QueueCounts, WorkQueue};

/// Outcome of an enqueue: a broker-assigned job or an upserted repeatable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Job(JobId),
    Repeatable { stable_id: String },
}

impl Enqueued {
    /// The id a caller can later pass to `remove`/`job_state`.
    pub fn id(&self) -> &str {
        match self {
            Enqueued::Job(id) => id.as_str(),
            Enqueued::Repeatable { stable_id } => stable_id,
        }
    }
}

#[derive(Clone)]
pub struct Broker {
    queues: HashMap<QueueName, WorkQueue>,
    clock: SystemClock,
}

impl Broker {
    pub fn new(conn: ConnectionManager) -> Self {
        let queues = QueueName::ALL
            .into_iter()
            .map(|name| (name, WorkQueue::new(name, conn.clone())))
            .collect();
        Self { queues, clock: SystemClock }
    }

    pub fn queue(&self, name: QueueName) -> &WorkQueue {
        // The map is total over QueueName by construction.
        match self.queues.get(&name) {
            Some(q) => q,
            None => unreachable!("queue map is total"),
        }
    }

    /// Enqueue a spec on the queue its name routes to.
    ///
    /// Repeatable specs (stable id + repeat) upsert a scheduler record;
    /// one-shot specs get a broker-assigned id.
    pub async fn enqueue(&self, spec: JobSpec) -> Result<Enqueued, BrokerError> {
        let queue = self.queue(spec.queue());
        let now_ms = self.clock.epoch_ms();

        if let Some(stable_id) = spec.stable_id.clone() {
            if spec.repeat.is_none() {
                return Err(BrokerError::InvalidSpec(format!(
                    "{stable_id} has a stable id but no repeat"
                )));
            }
            queue.upsert_repeat(&stable_id, &spec, now_ms).await?;
            return Ok(Enqueued::Repeatable { stable_id });
        }

        let id = JobId::new();
        let record = JobRecord::from_spec(&spec, id, now_ms);
        queue.push(&record).await?;
        debug!(job = %id, name = %spec.name(), queue = %spec.queue(), "enqueued");
        Ok(Enqueued::Job(id))
    }

    /// Find a job by id across all queues.
    pub async fn job(&self, id: &str) -> Result<Option<JobRecord>, BrokerError> {
        for name in QueueName::ALL {
            if let Some(record) = self.queue(name).get(id).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub async fn job_state(&self, id: &str) -> Result<Option<JobState>, BrokerError> {
        Ok(self.job(id).await?.map(|r| r.state))
    }

    /// Remove a job or repeatable by id. Direct job deletion is tried first,
    /// then repeat-record deletion, across all queues.
    pub async fn remove(&self, id: &str) -> Result<bool, BrokerError> {
        for name in QueueName::ALL {
            if self.queue(name).get(id).await?.is_some() {
                return self.queue(name).remove(id).await;
            }
        }
        for name in QueueName::ALL {
            if self.queue(name).remove_repeat(id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Re-enqueue a failed job.
    pub async fn retry(&self, id: &str) -> Result<(), BrokerError> {
        let now_ms = self.clock.epoch_ms();
        for name in QueueName::ALL {
            if self.queue(name).get(id).await?.is_some() {
                return self.queue(name).retry(id, now_ms).await;
            }
        }
        Err(BrokerError::JobNotFound(id.to_string()))
    }

    /// Operator override: mark a job completed wherever it sits.
    pub async fn force_complete(&self, id: &str) -> Result<(), BrokerError> {
        let now_ms = self.clock.epoch_ms();
        for name in QueueName::ALL {
            if let Some(mut record) = self.queue(name).get(id).await? {
                return self.queue(name).complete(&mut record, None, now_ms).await;
            }
        }
        Err(BrokerError::JobNotFound(id.to_string()))
    }

    /// Operator override: mark a job failed with no further retries.
    pub async fn force_fail(&self, id: &str, reason: &str) -> Result<(), BrokerError> {
        let now_ms = self.clock.epoch_ms();
        for name in QueueName::ALL {
            if let Some(mut record) = self.queue(name).get(id).await? {
                record.attempts_made = record.attempts;
                self.queue(name).fail(&mut record, reason, now_ms).await?;
                return Ok(());
            }
        }
        Err(BrokerError::JobNotFound(id.to_string()))
    }

    pub async fn counts(&self) -> Result<HashMap<QueueName, QueueCounts>, BrokerError> {
        let mut out = HashMap::new();
        for name in QueueName::ALL {
            out.insert(name, self.queue(name).counts().await?);
        }
        Ok(out)
    }

    /// Prune terminal jobs on every queue; returns total removed.
    pub async fn prune_terminal(&self) -> Result<u64, BrokerError> {
        let now_ms = self.clock.epoch_ms();
        let mut total = 0;
        for name in QueueName::ALL {
            total += self.queue(name).prune_terminal(now_ms).await?;
        }
        Ok(total)
    }
}
