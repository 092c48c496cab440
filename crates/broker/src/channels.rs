// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-channel state: reply addresses, activity timestamps, and the
//! proactive-engagement cooldown counters.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace::{self, ACTIVITY_TTL_SECS};

use crate::error::BrokerError;

#[derive(Clone)]
pub struct ChannelState {
    conn: ConnectionManager,
}

impl ChannelState {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Cache the last reply address for a channel (chat-adapter specific).
    pub async fn set_reply_address(
        &self,
        channel_id: &str,
        address: &str,
    ) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(keyspace::channel_state_key(channel_id), address).await?;
        Ok(())
    }

    pub async fn reply_address(&self, channel_id: &str) -> Result<Option<String>, BrokerError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(keyspace::channel_state_key(channel_id)).await?)
    }

    /// Stamp last-activity for a channel; proactive checks read this.
    pub async fn touch_activity(&self, channel_id: &str, now_ms: u64) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(
            keyspace::activity_key(channel_id),
            now_ms,
            ACTIVITY_TTL_SECS,
        )
        .await?;
        Ok(())
    }

    pub async fn last_activity(&self, channel_id: &str) -> Result<Option<u64>, BrokerError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(keyspace::activity_key(channel_id)).await?)
    }

    /// Arm the proactive cooldown; returns false if one was already armed.
    pub async fn arm_proactive_cooldown(
        &self,
        channel_id: &str,
        cooldown_secs: u64,
    ) -> Result<bool, BrokerError> {
        let mut conn = self.conn.clone();
        let armed: bool = redis::cmd("SET")
            .arg(keyspace::proactive_cooldown_key(channel_id))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(cooldown_secs)
            .query_async(&mut conn)
            .await?;
        Ok(armed)
    }

    /// Bump the daily proactive counter; the key expires after a day.
    pub async fn incr_proactive_daily(&self, channel_id: &str) -> Result<u64, BrokerError> {
        let mut conn = self.conn.clone();
        let key = keyspace::proactive_daily_key(channel_id);
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(&key, 24 * 3600).await?;
        }
        Ok(count)
    }
}
