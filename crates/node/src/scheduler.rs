// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler: persisted reminders and recurring tasks.
//!
//! A ScheduledJob row at `scheduled:{id}` is the durable record; the broker
//! entry that fires it is bound separately (a delayed one-shot, or a
//! repeatable keyed by the row's UUID). Fires are gated on `status ==
//! active`, and terminal marking happens only after the downstream enqueue
//! so a failed enqueue stays retryable.

use chrono::{Duration as ChronoDuration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_broker::Broker;
use sc_core::job::{JobPayload, JobSpec, Repeat};
use sc_core::keyspace;
use sc_core::schedule::{ScheduledJob, ScheduledJobKind, ScheduledJobStatus};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::NodeError;

/// Cron/interval/timezone triple for recurrent schedules.
#[derive(Debug, Clone, Default)]
pub struct RecurrenceSpec {
    pub cron: Option<String>,
    pub interval_ms: Option<u64>,
    pub timezone: Option<String>,
}

pub struct Scheduler {
    conn: ConnectionManager,
    broker: Broker,
}

impl Scheduler {
    pub fn new(conn: ConnectionManager, broker: Broker) -> Self {
        Self { conn, broker }
    }

    pub async fn create_reminder(
        &self,
        channel_id: &str,
        description: &str,
        delay_ms: u64,
    ) -> Result<Uuid, NodeError> {
        self.create_one_shot(channel_id, description, delay_ms, ScheduledJobKind::Reminder)
            .await
    }

    pub async fn create_task(
        &self,
        channel_id: &str,
        description: &str,
        delay_ms: u64,
    ) -> Result<Uuid, NodeError> {
        self.create_one_shot(channel_id, description, delay_ms, ScheduledJobKind::Task).await
    }

    pub async fn create_recurrent_reminder(
        &self,
        channel_id: &str,
        description: &str,
        recurrence: RecurrenceSpec,
    ) -> Result<Uuid, NodeError> {
        self.create_recurrent(
            channel_id,
            description,
            recurrence,
            ScheduledJobKind::RecurrentReminder,
        )
        .await
    }

    pub async fn create_recurrent_task(
        &self,
        channel_id: &str,
        description: &str,
        recurrence: RecurrenceSpec,
    ) -> Result<Uuid, NodeError> {
        self.create_recurrent(channel_id, description, recurrence, ScheduledJobKind::RecurrentTask)
            .await
    }

    async fn create_one_shot(
        &self,
        channel_id: &str,
        description: &str,
        delay_ms: u64,
        kind: ScheduledJobKind,
    ) -> Result<Uuid, NodeError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut row = ScheduledJob {
            id,
            channel_id: channel_id.to_string(),
            kind,
            description: description.to_string(),
            status: ScheduledJobStatus::Active,
            created_at: now,
            next_run_at: Some(now + ChronoDuration::milliseconds(delay_ms as i64)),
            cron: None,
            interval_ms: None,
            timezone: None,
            broker_job_id: None,
        };
        self.save(&row).await?;

        let payload = fire_payload(kind, id);
        let enqueued = self.broker.enqueue(JobSpec::new(payload).delay_ms(delay_ms)).await?;
        row.broker_job_id = Some(enqueued.id().to_string());
        self.save(&row).await?;
        info!(id = %id, kind = %kind, delay_ms, "one-shot schedule created");
        Ok(id)
    }

    async fn create_recurrent(
        &self,
        channel_id: &str,
        description: &str,
        recurrence: RecurrenceSpec,
        kind: ScheduledJobKind,
    ) -> Result<Uuid, NodeError> {
        let repeat = match (&recurrence.cron, recurrence.interval_ms) {
            (Some(pattern), _) => Repeat::Cron {
                pattern: pattern.clone(),
                tz: recurrence.timezone.clone(),
            },
            (None, Some(every_ms)) => Repeat::Every { every_ms },
            (None, None) => return Err(sc_core::ScheduleError::MissingSchedule.into()),
        };

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut row = ScheduledJob {
            id,
            channel_id: channel_id.to_string(),
            kind,
            description: description.to_string(),
            status: ScheduledJobStatus::Active,
            created_at: now,
            next_run_at: None,
            cron: recurrence.cron,
            interval_ms: recurrence.interval_ms,
            timezone: recurrence.timezone,
            broker_job_id: Some(id.to_string()),
        };
        row.next_run_at = row.next_fire(now)?;
        self.save(&row).await?;

        let spec = JobSpec::new(fire_payload(kind, id)).repeat(id.to_string(), repeat);
        self.broker.enqueue(spec).await?;
        info!(id = %id, kind = %kind, "recurrent schedule created");
        Ok(id)
    }

    /// Broker fire entry point. Gated on `active`; a cancelled or completed
    /// row makes the fire a silent no-op.
    pub async fn handle_fire(&self, scheduled_job_id: Uuid) -> Result<(), NodeError> {
        let Some(mut row) = self.load(scheduled_job_id).await? else {
            debug!(id = %scheduled_job_id, "fire for purged schedule, ignoring");
            return Ok(());
        };
        if row.status != ScheduledJobStatus::Active {
            debug!(id = %scheduled_job_id, status = %row.status, "fire gated, ignoring");
            return Ok(());
        }

        let (message, task) = if row.kind.is_task() {
            (None, Some(row.description.clone()))
        } else {
            (Some(row.description.clone()), None)
        };
        let fire = JobPayload::ScheduledFire {
            channel_id: row.channel_id.clone(),
            kind: row.kind,
            message,
            task,
            scheduled_job_id,
        };
        // Enqueue BEFORE terminal marking: a failure here leaves the row
        // active and the broker attempt retryable.
        self.broker.enqueue(JobSpec::new(fire)).await?;

        if row.kind.is_recurrent() {
            row.next_run_at = row.next_fire(Utc::now())?;
        } else {
            row.status = ScheduledJobStatus::Completed;
        }
        self.save(&row).await?;
        Ok(())
    }

    /// Stop future fires. Terminal: subsequent broker fires no-op.
    pub async fn cancel(&self, id: Uuid) -> Result<(), NodeError> {
        let Some(mut row) = self.load(id).await? else {
            return Err(NodeError::ScheduledJobNotFound(id.to_string()));
        };
        row.status = ScheduledJobStatus::Cancelled;
        self.save(&row).await?;
        if let Some(broker_id) = &row.broker_job_id {
            if let Err(e) = self.broker.remove(broker_id).await {
                warn!(id = %id, error = %e, "broker entry removal failed");
            }
        }
        info!(id = %id, "schedule cancelled");
        Ok(())
    }

    /// Mark a schedule completed and drop its broker entry.
    pub async fn complete(&self, id: Uuid) -> Result<(), NodeError> {
        let Some(mut row) = self.load(id).await? else {
            return Err(NodeError::ScheduledJobNotFound(id.to_string()));
        };
        row.status = ScheduledJobStatus::Completed;
        self.save(&row).await?;
        if let Some(broker_id) = &row.broker_job_id {
            let _ = self.broker.remove(broker_id).await;
        }
        Ok(())
    }

    /// Mark failed after the fire job exhausted its attempts.
    pub async fn mark_failed(&self, id: Uuid) -> Result<(), NodeError> {
        if let Some(mut row) = self.load(id).await? {
            row.status = ScheduledJobStatus::Failed;
            self.save(&row).await?;
        }
        Ok(())
    }

    /// Delete a non-active row.
    pub async fn purge(&self, id: Uuid) -> Result<(), NodeError> {
        let Some(row) = self.load(id).await? else {
            return Err(NodeError::ScheduledJobNotFound(id.to_string()));
        };
        if row.status == ScheduledJobStatus::Active {
            return Err(NodeError::Invalid("cannot purge an active schedule".into()));
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keyspace::scheduled_job_key(&id.to_string()))
            .await
            .map_err(sc_broker::BrokerError::from)?;
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<ScheduledJob>, NodeError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(keyspace::scheduled_scan_pattern())
                .await
                .map_err(sc_broker::BrokerError::from)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> =
                conn.get(&key).await.map_err(sc_broker::BrokerError::from)?;
            if let Some(raw) = raw {
                match serde_json::from_str::<ScheduledJob>(&raw) {
                    Ok(row) => rows.push(row),
                    Err(e) => warn!(key, error = %e, "undecodable scheduled job"),
                }
            }
        }
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<ScheduledJob>, NodeError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(keyspace::scheduled_job_key(&id.to_string()))
            .await
            .map_err(sc_broker::BrokerError::from)?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    async fn save(&self, row: &ScheduledJob) -> Result<(), NodeError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(
            keyspace::scheduled_job_key(&row.id.to_string()),
            serde_json::to_string(row)?,
        )
        .await
        .map_err(sc_broker::BrokerError::from)?;
        Ok(())
    }
}

fn fire_payload(kind: ScheduledJobKind, scheduled_job_id: Uuid) -> JobPayload {
    match kind {
        ScheduledJobKind::Reminder => JobPayload::Reminder { scheduled_job_id },
        ScheduledJobKind::RecurrentReminder => {
            JobPayload::RecurrentReminder { scheduled_job_id }
        }
        ScheduledJobKind::Task => JobPayload::Task { scheduled_job_id },
        ScheduledJobKind::RecurrentTask => JobPayload::RecurrentTask { scheduled_job_id },
    }
}
