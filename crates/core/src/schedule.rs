// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled reminders and tasks, persisted separately from the broker jobs
//! that fire them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid cron pattern '{0}'")]
    InvalidCron(String),

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("schedule has neither cron pattern nor interval")]
    MissingSchedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduledJobKind {
    Reminder,
    RecurrentReminder,
    Task,
    RecurrentTask,
}

impl ScheduledJobKind {
    pub fn is_recurrent(&self) -> bool {
        matches!(self, ScheduledJobKind::RecurrentReminder | ScheduledJobKind::RecurrentTask)
    }

    pub fn is_task(&self) -> bool {
        matches!(self, ScheduledJobKind::Task | ScheduledJobKind::RecurrentTask)
    }

    /// The broker job name a schedule of this kind binds to.
    pub fn job_name(&self) -> crate::job::JobName {
        match self {
            ScheduledJobKind::Reminder => crate::job::JobName::Reminder,
            ScheduledJobKind::RecurrentReminder => crate::job::JobName::RecurrentReminder,
            ScheduledJobKind::Task => crate::job::JobName::Task,
            ScheduledJobKind::RecurrentTask => crate::job::JobName::RecurrentTask,
        }
    }
}

crate::simple_display! {
    ScheduledJobKind {
        Reminder => "reminder",
        RecurrentReminder => "recurrent-reminder",
        Task => "task",
        RecurrentTask => "recurrent-task",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledJobStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    ScheduledJobStatus {
        Active => "active",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// A persisted reminder or recurring task, stored at `scheduled:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: Uuid,
    pub channel_id: String,
    pub kind: ScheduledJobKind,
    pub description: String,
    pub status: ScheduledJobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_job_id: Option<String>,
}

impl ScheduledJob {
    /// The next fire time after `now`, from the cron pattern or interval.
    ///
    /// One-shot schedules return `None` here; their single fire time is fixed
    /// at creation via `next_run_at`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        if !self.kind.is_recurrent() {
            return Ok(None);
        }
        if let Some(pattern) = &self.cron {
            return next_cron_fire(pattern, self.timezone.as_deref(), now).map(Some);
        }
        if let Some(interval_ms) = self.interval_ms {
            return Ok(Some(now + Duration::milliseconds(interval_ms as i64)));
        }
        Err(ScheduleError::MissingSchedule)
    }
}

/// Compute the next fire of a cron pattern after `now`, in the given timezone.
///
/// Accepts the common 5-field form; a seconds field of `0` is prepended
/// before parsing.
pub fn next_cron_fire(
    pattern: &str,
    tz: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let normalized = normalize_cron(pattern);
    let schedule = cron::Schedule::from_str(&normalized)
        .map_err(|_| ScheduleError::InvalidCron(pattern.to_string()))?;

    match tz {
        Some(name) => {
            let tz: chrono_tz::Tz = name
                .parse()
                .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))?;
            schedule
                .after(&now.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ScheduleError::InvalidCron(pattern.to_string()))
        }
        None => schedule
            .after(&now)
            .next()
            .ok_or_else(|| ScheduleError::InvalidCron(pattern.to_string())),
    }
}

/// Prepend a seconds field to 5-field patterns; 6/7-field pass through.
fn normalize_cron(pattern: &str) -> String {
    let fields = pattern.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", pattern.trim())
    } else {
        pattern.trim().to_string()
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
