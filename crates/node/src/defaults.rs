// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default collaborator implementations for a node booted without external
//! integrations: the provider refuses politely, messages stay in memory,
//! usage counters live in Redis, and outbound sends are logged.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::NodeError;
use crate::traits::{
    ChannelSink, ChatProvider, MemoryIndex, ProviderResponse, TokenUsage, Turn, UsageStore,
    UsageTotals,
};

/// Stands in until a real LLM client is wired through [`ChatProvider`].
pub struct UnconfiguredProvider;

#[async_trait]
impl ChatProvider for UnconfiguredProvider {
    async fn complete(
        &self,
        _system: &str,
        _turns: &[Turn],
        _abort: &CancellationToken,
    ) -> Result<ProviderResponse, NodeError> {
        Err(NodeError::Provider("no chat provider configured".into()))
    }
}

/// In-process message history; a durable store plugs in via [`MessageStore`].
pub type EphemeralMessageStore = crate::traits::fakes::MemoryMessageStore;

/// Token accounting over Redis day/month counters.
pub struct RedisUsageStore {
    conn: ConnectionManager,
}

impl RedisUsageStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn day_key() -> String {
        keyspace::usage_daily_key(&Utc::now().format("%Y-%m-%d").to_string())
    }

    fn month_key() -> String {
        keyspace::usage_monthly_key(&Utc::now().format("%Y-%m").to_string())
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn record(&self, usage: TokenUsage) -> Result<(), NodeError> {
        let mut conn = self.conn.clone();
        let total = usage.total();
        redis::pipe()
            .cmd("INCRBY")
            .arg(Self::day_key())
            .arg(total)
            .ignore()
            .cmd("EXPIRE")
            .arg(Self::day_key())
            .arg(2 * 24 * 3600)
            .ignore()
            .cmd("INCRBY")
            .arg(Self::month_key())
            .arg(total)
            .ignore()
            .cmd("EXPIRE")
            .arg(Self::month_key())
            .arg(40 * 24 * 3600)
            .ignore()
            .exec_async(&mut conn)
            .await
            .map_err(sc_broker::BrokerError::from)?;
        Ok(())
    }

    async fn totals(&self) -> Result<UsageTotals, NodeError> {
        let mut conn = self.conn.clone();
        let daily: Option<u64> = conn
            .get(Self::day_key())
            .await
            .map_err(sc_broker::BrokerError::from)?;
        let monthly: Option<u64> = conn
            .get(Self::month_key())
            .await
            .map_err(sc_broker::BrokerError::from)?;
        Ok(UsageTotals {
            daily_tokens: daily.unwrap_or(0),
            monthly_tokens: monthly.unwrap_or(0),
        })
    }
}

/// Logs outbound deliveries; chat-platform adapters replace this.
pub struct LoggingSink;

#[async_trait]
impl ChannelSink for LoggingSink {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), NodeError> {
        info!(channel = channel_id, text, "outbound message (no adapter connected)");
        Ok(())
    }

    async fn send_file(
        &self,
        channel_id: &str,
        path: &str,
        _caption: Option<&str>,
    ) -> Result<(), NodeError> {
        info!(channel = channel_id, path, "outbound file (no adapter connected)");
        Ok(())
    }
}

/// Memory extraction is a no-op until an index is connected.
pub struct NoopMemoryIndex;

#[async_trait]
impl MemoryIndex for NoopMemoryIndex {
    async fn extract(
        &self,
        channel_id: &str,
        _user_text: &str,
        _assistant_text: &str,
    ) -> Result<(), NodeError> {
        debug!(channel = channel_id, "memory extraction skipped (no index connected)");
        Ok(())
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<String>, NodeError> {
        Ok(vec![])
    }
}
