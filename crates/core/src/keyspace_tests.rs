// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn keys_carry_namespace() {
    assert_eq!(config_key(), "scalyclaw:config");
    assert_eq!(secret_key("openai"), "scalyclaw:secret:openai");
    assert_eq!(recovery_key(), "scalyclaw:vault:recovery-key");
    assert_eq!(channel_state_key("telegram"), "scalyclaw:channel:state:telegram");
    assert_eq!(response_buffer_key("job-1"), "scalyclaw:response:job-1");
    assert_eq!(job_cancel_key("job-1"), "scalyclaw:cancel:job-1");
    assert_eq!(job_pid_key("job-1"), "scalyclaw:pid:job-1");
    assert_eq!(channel_jobs_key("gateway"), "scalyclaw:jobs:gateway");
    assert_eq!(scheduled_job_key("abc"), "scalyclaw:scheduled:abc");
}

#[test]
fn process_and_proactive_keys_are_unnamespaced() {
    assert_eq!(process_key("prc-1"), "process:prc-1");
    assert_eq!(proactive_cooldown_key("slack"), "proactive:cooldown:slack");
    assert_eq!(proactive_daily_key("slack"), "proactive:daily:slack");
}

#[test]
fn progress_channel_round_trip() {
    let ch = progress_channel("gateway");
    assert_eq!(ch, "progress:gateway");
    assert_eq!(parse_progress_channel(&ch), Some("gateway"));
    assert_eq!(parse_progress_channel("other:gateway"), None);
}

#[test]
fn secret_name_round_trip() {
    let key = secret_key("api-token");
    assert_eq!(secret_name_from_key(&key), Some("api-token"));
}

#[parameterized(
    waiting = { "waiting" },
    delayed = { "delayed" },
    data = { "data" },
)]
fn queue_keys_embed_queue_name(section: &str) {
    let key = queue_key(QueueName::Tools, section);
    assert_eq!(key, format!("scalyclaw:queue:tools:{section}"));
}

#[test]
fn heartbeat_is_a_third_of_process_ttl() {
    assert!(HEARTBEAT_INTERVAL_SECS * 3 == PROCESS_TTL_SECS);
}
