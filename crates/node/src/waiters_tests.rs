// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn terminal_event_resolves_waiter() {
    let waiters = ProgressWaiters::new();
    let rx = waiters.register("gateway", "job-1");
    waiters.resolve("gateway", &ProgressEvent::complete("job-1", "done"));
    let event = rx.await.unwrap();
    assert_eq!(event.result.as_deref(), Some("done"));
    assert_eq!(waiters.len(), 0);
}

#[tokio::test]
async fn non_terminal_events_do_not_resolve() {
    let waiters = ProgressWaiters::new();
    let mut rx = waiters.register("gateway", "job-1");
    waiters.resolve("gateway", &ProgressEvent::typing("job-1"));
    waiters.resolve("gateway", &ProgressEvent::progress("job-1", "thinking"));
    assert!(rx.try_recv().is_err());
    assert_eq!(waiters.len(), 1);
}

#[tokio::test]
async fn waiters_are_keyed_by_channel_and_job() {
    let waiters = ProgressWaiters::new();
    let mut other_channel = waiters.register("slack", "job-1");
    let mut other_job = waiters.register("gateway", "job-2");
    let mine = waiters.register("gateway", "job-1");

    waiters.resolve("gateway", &ProgressEvent::error("job-1", "boom"));

    assert!(mine.await.is_ok());
    assert!(other_channel.try_recv().is_err());
    assert!(other_job.try_recv().is_err());
}

#[tokio::test]
async fn error_is_terminal_too() {
    let waiters = ProgressWaiters::new();
    let rx = waiters.register("gateway", "job-9");
    waiters.resolve("gateway", &ProgressEvent::error("job-9", "nope"));
    let event = rx.await.unwrap();
    assert_eq!(event.kind, sc_core::ProgressKind::Error);
}
