// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis key-space: every key and pub/sub channel the runtime touches.
//!
//! All keys live under the `scalyclaw:` namespace except `process:{id}`,
//! which dashboards scan without knowing the install namespace.

use crate::job::QueueName;

pub const NAMESPACE: &str = "scalyclaw";

// --- TTLs and intervals (seconds unless noted) ---

/// Process registry entry TTL. Dead processes age out after this.
pub const PROCESS_TTL_SECS: u64 = 60;
/// Registry heartbeat refresh cadence (~⅓ of the TTL).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 20;
/// Per-job and global cancel flags.
pub const CANCEL_FLAG_TTL_SECS: u64 = 60;
/// Buffered progress events kept for reconnecting clients.
pub const RESPONSE_BUFFER_TTL_SECS: u64 = 300;
/// Max buffered progress events per job.
pub const RESPONSE_BUFFER_MAX: usize = 100;
/// Previous vault key held during rotation.
pub const RECOVERY_KEY_TTL_SECS: u64 = 300;
/// Last-activity timestamp per channel.
pub const ACTIVITY_TTL_SECS: u64 = 7 * 24 * 3600;
/// Worker PID entries, refreshed while a subprocess runs.
pub const PID_TTL_SECS: u64 = 6 * 3600;

// --- Job lock / retention (milliseconds) ---

/// Lease granted to an active job. Renewed at ⅓ cadence while the handler
/// runs, so total handler runtime is unbounded; a handler that stops
/// renewing is stalled and the job is redelivered.
pub const JOB_LOCK_MS: u64 = 60_000;
/// Completed jobs pruned after this age or beyond this count.
pub const COMPLETED_RETENTION_MS: u64 = 3_600_000;
pub const COMPLETED_RETENTION_COUNT: usize = 1_000;
/// Failed jobs kept longer for inspection.
pub const FAILED_RETENTION_MS: u64 = 24 * 3_600_000;
pub const FAILED_RETENTION_COUNT: usize = 5_000;

// --- Pub/sub channels ---

pub const PROGRESS_PATTERN: &str = "progress:*";
pub const CANCEL_CHANNEL: &str = "scalyclaw:cancel:signal";
pub const CONFIG_RELOAD_CHANNEL: &str = "scalyclaw:config:reload";
pub const SKILLS_RELOAD_CHANNEL: &str = "scalyclaw:skills:reload";
pub const MCP_RELOAD_CHANNEL: &str = "scalyclaw:mcp:reload";

pub fn progress_channel(channel_id: &str) -> String {
    format!("progress:{channel_id}")
}

/// Extract the channel id from a `progress:{id}` pub/sub channel name.
pub fn parse_progress_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix("progress:")
}

// --- Keys ---

pub fn config_key() -> String {
    format!("{NAMESPACE}:config")
}

pub fn secret_key(name: &str) -> String {
    format!("{NAMESPACE}:secret:{name}")
}

pub fn secret_scan_pattern() -> String {
    format!("{NAMESPACE}:secret:*")
}

/// Strip the secret prefix from a scanned key.
pub fn secret_name_from_key(key: &str) -> Option<&str> {
    key.strip_prefix("scalyclaw:secret:")
}

pub fn recovery_key() -> String {
    format!("{NAMESPACE}:vault:recovery-key")
}

pub fn channel_state_key(channel_id: &str) -> String {
    format!("{NAMESPACE}:channel:state:{channel_id}")
}

pub fn ratelimit_key(scope: &str) -> String {
    format!("{NAMESPACE}:ratelimit:{scope}")
}

pub fn response_buffer_key(job_id: &str) -> String {
    format!("{NAMESPACE}:response:{job_id}")
}

pub fn activity_key(channel_id: &str) -> String {
    format!("{NAMESPACE}:activity:{channel_id}")
}

pub fn scheduled_job_key(id: &str) -> String {
    format!("{NAMESPACE}:scheduled:{id}")
}

pub fn scheduled_scan_pattern() -> String {
    format!("{NAMESPACE}:scheduled:*")
}

pub fn cancel_flag_key() -> String {
    format!("{NAMESPACE}:cancel")
}

pub fn job_cancel_key(job_id: &str) -> String {
    format!("{NAMESPACE}:cancel:{job_id}")
}

pub fn job_pid_key(job_id: &str) -> String {
    format!("{NAMESPACE}:pid:{job_id}")
}

pub fn channel_jobs_key(channel_id: &str) -> String {
    format!("{NAMESPACE}:jobs:{channel_id}")
}

pub fn process_key(process_id: &str) -> String {
    format!("process:{process_id}")
}

pub fn usage_daily_key(date: &str) -> String {
    format!("{NAMESPACE}:usage:daily:{date}")
}

pub fn usage_monthly_key(month: &str) -> String {
    format!("{NAMESPACE}:usage:monthly:{month}")
}

pub const PROCESS_SCAN_PATTERN: &str = "process:*";

pub fn proactive_cooldown_key(channel_id: &str) -> String {
    format!("proactive:cooldown:{channel_id}")
}

pub fn proactive_daily_key(channel_id: &str) -> String {
    format!("proactive:daily:{channel_id}")
}

// --- Queue keys ---
//
// Each queue owns a fixed family of structures:
//   waiting      LIST   FIFO of job ids at priority 0
//   prioritized  ZSET   score = (-priority, seq) packed, popped before waiting
//   delayed      ZSET   score = run_at_ms
//   active       ZSET   score = lease deadline ms
//   completed    ZSET   score = finished_at ms
//   failed       ZSET   score = finished_at ms
//   data         HASH   job id → JobRecord JSON
//   repeat       HASH   stable id → Repeat spec JSON
//   seen         SET    fire keys already enqueued for repeatables

pub fn queue_key(queue: QueueName, section: &str) -> String {
    format!("{NAMESPACE}:queue:{}:{section}", queue.as_str())
}

#[cfg(test)]
#[path = "keyspace_tests.rs"]
mod tests;
