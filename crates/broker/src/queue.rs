// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-queue work-queue engine over Redis.
//!
//! Each queue owns a waiting LIST, prioritized/delayed/active/completed/
//! failed ZSETs, a data HASH of job records, and a repeat HASH of
//! repeatable specs. Waiting→active moves run as small Lua scripts so a
//! crash between commands cannot drop a job; everything else is plain
//! commands. Delivery is at-least-once: a consumer that stops renewing its
//! lease gets its job redelivered.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use sc_core::job::{JobRecord, JobSpec, JobState, QueueName, Repeat};
use sc_core::keyspace::{self, JOB_LOCK_MS};
use sc_core::schedule::next_cron_fire;
use sc_core::JobId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BrokerError;

/// Move the best waiting job into the active set with a lease deadline.
/// Prioritized jobs (ZPOPMAX on composite score) win over plain FIFO.
const POP_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMAX', KEYS[1])
local id = popped[1]
if not id then
  id = redis.call('LPOP', KEYS[2])
end
if not id then
  return false
end
redis.call('ZADD', KEYS[3], tonumber(ARGV[1]) + tonumber(ARGV[2]), id)
return id
"#;

/// Promote delayed jobs whose run-at has passed back onto the waiting list.
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(due) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('RPUSH', KEYS[2], id)
end
return #due
"#;

/// Requeue active jobs whose lease deadline has passed (stalled consumers).
const STALLED_SCRIPT: &str = r#"
local stalled = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
for _, id in ipairs(stalled) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('RPUSH', KEYS[2], id)
end
return #stalled
"#;

/// Stored form of a repeatable spec plus its next computed fire time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepeatRecord {
    spec: JobSpec,
    next_ms: u64,
}

/// Waiting/active/…/failed cardinalities for one queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub waiting: u64,
    pub prioritized: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct WorkQueue {
    queue: QueueName,
    conn: ConnectionManager,
}

impl WorkQueue {
    pub fn new(queue: QueueName, conn: ConnectionManager) -> Self {
        Self { queue, conn }
    }

    pub fn name(&self) -> QueueName {
        self.queue
    }

    fn key(&self, section: &str) -> String {
        keyspace::queue_key(self.queue, section)
    }

    /// Composite prioritized score: higher priority first, FIFO within.
    fn prioritized_score(priority: i32, seq: u64) -> f64 {
        (priority as f64) * 1e13 - (seq as f64)
    }

    /// Add a one-shot job. The record's initial state decides the target
    /// structure (waiting list, prioritized zset, or delayed zset).
    pub async fn push(&self, record: &JobRecord) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let data = serde_json::to_string(record)?;
        let id = record.id.as_str();

        conn.hset::<_, _, _, ()>(self.key("data"), id, &data).await?;
        match record.state {
            JobState::Delayed => {
                conn.zadd::<_, _, _, ()>(self.key("delayed"), id, record.run_at_ms as f64).await?;
            }
            JobState::Prioritized => {
                let seq: u64 = conn.incr(self.key("seq"), 1).await?;
                conn.zadd::<_, _, _, ()>(
                    self.key("prioritized"),
                    id,
                    Self::prioritized_score(record.priority, seq),
                )
                .await?;
            }
            _ => {
                conn.rpush::<_, _, ()>(self.key("waiting"), id).await?;
            }
        }
        debug!(queue = %self.queue, job = id, state = %record.state, "job pushed");
        Ok(())
    }

    /// Pop the next runnable job, moving it to active with a fresh lease.
    pub async fn pop(&self, now_ms: u64) -> Result<Option<JobRecord>, BrokerError> {
        let mut conn = self.conn.clone();
        let id: Option<String> = Script::new(POP_SCRIPT)
            .key(self.key("prioritized"))
            .key(self.key("waiting"))
            .key(self.key("active"))
            .arg(now_ms)
            .arg(JOB_LOCK_MS)
            .invoke_async(&mut conn)
            .await?;

        let Some(id) = id else { return Ok(None) };

        let raw: Option<String> = conn.hget(self.key("data"), &id).await?;
        let Some(raw) = raw else {
            // Record vanished under us (pruned); drop the orphan id.
            conn.zrem::<_, _, ()>(self.key("active"), &id).await?;
            return Ok(None);
        };
        let mut record: JobRecord = serde_json::from_str(&raw)?;
        record.state = JobState::Active;
        record.attempts_made += 1;
        self.write_record(&record).await?;
        Ok(Some(record))
    }

    /// Extend the lease of an active job. No-op if the job left active.
    pub async fn renew_lease(&self, id: &JobId, now_ms: u64) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let deadline = (now_ms + JOB_LOCK_MS) as f64;
        // XX: only refresh an existing lease, never resurrect.
        let _: () = redis::cmd("ZADD")
            .arg(self.key("active"))
            .arg("XX")
            .arg(deadline)
            .arg(id.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Promote due delayed jobs; returns how many moved.
    pub async fn promote_due(&self, now_ms: u64) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let moved: u64 = Script::new(PROMOTE_SCRIPT)
            .key(self.key("delayed"))
            .key(self.key("waiting"))
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    /// Requeue jobs whose lease expired; returns how many were stalled.
    pub async fn requeue_stalled(&self, now_ms: u64) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let moved: u64 = Script::new(STALLED_SCRIPT)
            .key(self.key("active"))
            .key(self.key("waiting"))
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;
        if moved > 0 {
            warn!(queue = %self.queue, count = moved, "requeued stalled jobs");
        }
        Ok(moved)
    }

    /// Mark a job completed with its return value.
    pub async fn complete(
        &self,
        record: &mut JobRecord,
        return_value: Option<serde_json::Value>,
        now_ms: u64,
    ) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        record.state = JobState::Completed;
        record.finished_at_ms = Some(now_ms);
        record.return_value = return_value;
        self.write_record(record).await?;
        redis::pipe()
            .zrem(self.key("active"), record.id.as_str())
            .ignore()
            .zadd(self.key("completed"), record.id.as_str(), now_ms as f64)
            .ignore()
            .exec_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Record a handler failure: retry with backoff while attempts remain,
    /// otherwise move to failed.
    pub async fn fail(
        &self,
        record: &mut JobRecord,
        error: &str,
        now_ms: u64,
    ) -> Result<JobState, BrokerError> {
        let mut conn = self.conn.clone();
        record.last_error = Some(error.to_string());

        if record.attempts_made < record.attempts {
            let delay = record.backoff.delay_for(record.attempts_made);
            record.state = JobState::Delayed;
            record.run_at_ms = now_ms + delay;
            self.write_record(record).await?;
            redis::pipe()
                .zrem(self.key("active"), record.id.as_str())
                .ignore()
                .zadd(self.key("delayed"), record.id.as_str(), record.run_at_ms as f64)
                .ignore()
                .exec_async(&mut conn)
                .await?;
            debug!(
                queue = %self.queue,
                job = %record.id,
                attempt = record.attempts_made,
                delay_ms = delay,
                "job retry scheduled"
            );
        } else {
            record.state = JobState::Failed;
            record.finished_at_ms = Some(now_ms);
            self.write_record(record).await?;
            redis::pipe()
                .zrem(self.key("active"), record.id.as_str())
                .ignore()
                .zadd(self.key("failed"), record.id.as_str(), now_ms as f64)
                .ignore()
                .exec_async(&mut conn)
                .await?;
            warn!(queue = %self.queue, job = %record.id, error, "job failed permanently");
        }
        Ok(record.state)
    }

    pub async fn get(&self, id: &str) -> Result<Option<JobRecord>, BrokerError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.key("data"), id).await?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        })
    }

    /// Remove a job in any non-active state. Active jobs are refused.
    pub async fn remove(&self, id: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let lease: Option<f64> = conn.zscore(self.key("active"), id).await?;
        if lease.is_some() {
            return Err(BrokerError::ActiveJob(id.to_string()));
        }
        let existed: bool = conn.hdel(self.key("data"), id).await?;
        redis::pipe()
            .lrem(self.key("waiting"), 0, id)
            .ignore()
            .zrem(self.key("prioritized"), id)
            .ignore()
            .zrem(self.key("delayed"), id)
            .ignore()
            .zrem(self.key("completed"), id)
            .ignore()
            .zrem(self.key("failed"), id)
            .ignore()
            .exec_async(&mut conn)
            .await?;
        Ok(existed)
    }

    /// Re-enqueue a failed job with its attempt budget reset.
    pub async fn retry(&self, id: &str, now_ms: u64) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let mut record = self.get(id).await?.ok_or_else(|| BrokerError::JobNotFound(id.into()))?;
        if record.state != JobState::Failed {
            return Err(BrokerError::ActiveJob(id.to_string()));
        }
        record.state = JobState::Waiting;
        record.attempts_made = 0;
        record.last_error = None;
        record.finished_at_ms = None;
        record.run_at_ms = now_ms;
        self.write_record(&record).await?;
        redis::pipe()
            .zrem(self.key("failed"), id)
            .ignore()
            .rpush(self.key("waiting"), id)
            .ignore()
            .exec_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn counts(&self) -> Result<QueueCounts, BrokerError> {
        let mut conn = self.conn.clone();
        let (waiting, prioritized, delayed, active, completed, failed): (
            u64,
            u64,
            u64,
            u64,
            u64,
            u64,
        ) = redis::pipe()
            .llen(self.key("waiting"))
            .zcard(self.key("prioritized"))
            .zcard(self.key("delayed"))
            .zcard(self.key("active"))
            .zcard(self.key("completed"))
            .zcard(self.key("failed"))
            .query_async(&mut conn)
            .await?;
        Ok(QueueCounts { waiting, prioritized, delayed, active, completed, failed })
    }

    /// Drop terminal jobs past the age or count caps.
    pub async fn prune_terminal(&self, now_ms: u64) -> Result<u64, BrokerError> {
        let completed = self
            .prune_set(
                "completed",
                now_ms.saturating_sub(keyspace::COMPLETED_RETENTION_MS),
                keyspace::COMPLETED_RETENTION_COUNT,
            )
            .await?;
        let failed = self
            .prune_set(
                "failed",
                now_ms.saturating_sub(keyspace::FAILED_RETENTION_MS),
                keyspace::FAILED_RETENTION_COUNT,
            )
            .await?;
        Ok(completed + failed)
    }

    async fn prune_set(
        &self,
        section: &str,
        cutoff_ms: u64,
        max_count: usize,
    ) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let key = self.key(section);

        let mut victims: Vec<String> =
            conn.zrangebyscore(&key, "-inf", cutoff_ms as f64).await?;

        let total: u64 = conn.zcard(&key).await?;
        let over = (total as usize).saturating_sub(max_count);
        if over > 0 {
            let oldest: Vec<String> = conn.zrange(&key, 0, over as isize - 1).await?;
            victims.extend(oldest);
        }
        victims.sort();
        victims.dedup();

        if victims.is_empty() {
            return Ok(0);
        }
        let mut pipe = redis::pipe();
        for id in &victims {
            pipe.zrem(&key, id).ignore();
            pipe.hdel(self.key("data"), id).ignore();
        }
        pipe.exec_async(&mut conn).await?;
        Ok(victims.len() as u64)
    }

    // --- Repeatables ---

    /// Upsert a repeatable spec under its stable client-chosen id.
    pub async fn upsert_repeat(
        &self,
        stable_id: &str,
        spec: &JobSpec,
        now_ms: u64,
    ) -> Result<(), BrokerError> {
        let repeat = spec
            .repeat
            .as_ref()
            .ok_or_else(|| BrokerError::InvalidSpec(format!("{stable_id} has no repeat")))?;
        let next_ms = next_repeat_fire(repeat, now_ms)?;
        let record = RepeatRecord { spec: spec.clone(), next_ms };
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(self.key("repeat"), stable_id, serde_json::to_string(&record)?)
            .await?;
        debug!(queue = %self.queue, stable_id, next_ms, "repeatable upserted");
        Ok(())
    }

    pub async fn remove_repeat(&self, stable_id: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let removed: bool = conn.hdel(self.key("repeat"), stable_id).await?;
        Ok(removed)
    }

    pub async fn has_repeat(&self, stable_id: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        Ok(conn.hexists(self.key("repeat"), stable_id).await?)
    }

    /// Enqueue one-shot copies for every repeatable whose fire time passed.
    ///
    /// Fire keys `{stable_id}:{fire_ms}` in a `seen` set make the promotion
    /// idempotent under promoter redelivery.
    pub async fn promote_repeats(&self, now_ms: u64) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let all: Vec<(String, String)> = conn.hgetall(self.key("repeat")).await?;
        let mut fired = 0u64;

        for (stable_id, raw) in all {
            let mut record: RepeatRecord = match serde_json::from_str(&raw) {
                Ok(r) => r,
                Err(e) => {
                    warn!(queue = %self.queue, stable_id, error = %e, "corrupt repeat record");
                    continue;
                }
            };
            if record.next_ms > now_ms {
                continue;
            }

            let fire_key = format!("{stable_id}:{}", record.next_ms);
            let fresh: bool = conn.sadd(self.key("seen"), &fire_key).await?;
            conn.expire::<_, ()>(self.key("seen"), 24 * 3600).await?;
            if fresh {
                let mut one_shot = record.spec.clone();
                one_shot.repeat = None;
                one_shot.stable_id = None;
                one_shot.delay_ms = 0;
                let job = JobRecord::from_spec(&one_shot, JobId::new(), now_ms);
                self.push(&job).await?;
                fired += 1;
            }

            // Catch up past the wall clock so a long pause fires once, not N times.
            let repeat = match &record.spec.repeat {
                Some(r) => r.clone(),
                None => continue,
            };
            let mut next = next_repeat_fire_after(&repeat, record.next_ms)?;
            while next <= now_ms {
                next = next_repeat_fire_after(&repeat, next)?;
            }
            record.next_ms = next;
            conn.hset::<_, _, _, ()>(
                self.key("repeat"),
                &stable_id,
                serde_json::to_string(&record)?,
            )
            .await?;
        }
        Ok(fired)
    }

    async fn write_record(&self, record: &JobRecord) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(
            self.key("data"),
            record.id.as_str(),
            serde_json::to_string(record)?,
        )
        .await?;
        Ok(())
    }
}

/// First fire of a repeat spec strictly after `now_ms`.
fn next_repeat_fire(repeat: &Repeat, now_ms: u64) -> Result<u64, BrokerError> {
    next_repeat_fire_after(repeat, now_ms)
}

fn next_repeat_fire_after(repeat: &Repeat, after_ms: u64) -> Result<u64, BrokerError> {
    match repeat {
        Repeat::Every { every_ms } => Ok(after_ms + (*every_ms).max(1)),
        Repeat::Cron { pattern, tz } => {
            let after = chrono::DateTime::from_timestamp_millis(after_ms as i64)
                .unwrap_or_else(chrono::Utc::now);
            let next = next_cron_fire(pattern, tz.as_deref(), after)?;
            Ok(next.timestamp_millis() as u64)
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
