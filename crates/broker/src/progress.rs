// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress bus: publish on `progress:{channelId}`, pattern-subscribe
//! `progress:*`.
//!
//! Publishing dual-writes a bounded per-job buffer so reconnecting clients
//! can fetch events they missed; the buffer expires after a few minutes.

use futures_util::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace::{
    self, RESPONSE_BUFFER_MAX, RESPONSE_BUFFER_TTL_SECS,
};
use sc_core::ProgressEvent;
use std::pin::Pin;
use tracing::debug;

use crate::error::BrokerError;

/// Stream of `(channel_id, event)` pairs from the pattern subscription.
pub type ProgressStream = Pin<Box<dyn Stream<Item = (String, ProgressEvent)> + Send>>;

#[derive(Clone)]
pub struct ProgressBus {
    conn: ConnectionManager,
    client: redis::Client,
}

impl ProgressBus {
    pub fn new(conn: ConnectionManager, client: redis::Client) -> Self {
        Self { conn, client }
    }

    /// Publish an event for a channel and append it to the job's buffer.
    ///
    /// Per-channel publish order is preserved: all publishes for a channel
    /// go through this single multiplexed connection.
    pub async fn publish(
        &self,
        channel_id: &str,
        event: &ProgressEvent,
    ) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        let buffer_key = keyspace::response_buffer_key(&event.job_id);

        debug!(channel = channel_id, job = %event.job_id, kind = %event.kind, "progress");
        redis::pipe()
            .publish(keyspace::progress_channel(channel_id), &payload)
            .ignore()
            .rpush(&buffer_key, &payload)
            .ignore()
            .ltrim(&buffer_key, -(RESPONSE_BUFFER_MAX as isize), -1)
            .ignore()
            .expire(&buffer_key, RESPONSE_BUFFER_TTL_SECS as i64)
            .ignore()
            .exec_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Buffered events for a job, for clients that (re)connect late.
    pub async fn buffered(&self, job_id: &str) -> Result<Vec<ProgressEvent>, BrokerError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> =
            conn.lrange(keyspace::response_buffer_key(job_id), 0, -1).await?;
        Ok(raw.iter().filter_map(|s| serde_json::from_str(s).ok()).collect())
    }

    /// Subscribe to every channel's progress events.
    ///
    /// One long-lived receive loop per process demultiplexes this stream to
    /// its waiters; see the gateway's chat waiter registry.
    pub async fn subscribe_pattern(&self) -> Result<ProgressStream, BrokerError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(keyspace::PROGRESS_PATTERN).await?;
        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let channel_id =
                keyspace::parse_progress_channel(msg.get_channel_name())?.to_string();
            let payload: String = msg.get_payload().ok()?;
            let event: ProgressEvent = serde_json::from_str(&payload).ok()?;
            Some((channel_id, event))
        });
        Ok(Box::pin(stream))
    }
}
