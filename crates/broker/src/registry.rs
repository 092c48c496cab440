// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process registry with heartbeat-refreshed TTL entries.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace::{self, HEARTBEAT_INTERVAL_SECS, PROCESS_TTL_SECS};
use sc_core::ProcessInfo;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BrokerError;

#[derive(Clone)]
pub struct ProcessRegistry {
    conn: ConnectionManager,
}

/// Keeps the heartbeat alive; dropping it (or calling `deregister`) stops
/// the refresh and lets the entry age out.
pub struct RegistrationHandle {
    process_id: String,
    stop: CancellationToken,
    registry: ProcessRegistry,
}

impl ProcessRegistry {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Write the entry and start a heartbeat that refreshes uptime and TTL
    /// every ~⅓ of the TTL.
    pub async fn register(&self, info: ProcessInfo) -> Result<RegistrationHandle, BrokerError> {
        self.write(&info).await?;
        info!(id = %info.id, kind = %info.process_type, "process registered");

        let stop = CancellationToken::new();
        let beat_stop = stop.clone();
        let registry = self.clone();
        let started_at = info.started_at;
        let mut entry = info.clone();
        tokio::spawn(async move {
            let interval = Duration::from_secs(HEARTBEAT_INTERVAL_SECS);
            loop {
                tokio::select! {
                    _ = beat_stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let now_ms = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .unwrap_or_default()
                            .as_millis() as u64;
                        entry.uptime = (now_ms.saturating_sub(started_at)) / 1_000;
                        if let Err(e) = registry.write(&entry).await {
                            warn!(id = %entry.id, error = %e, "heartbeat write failed");
                        } else {
                            debug!(id = %entry.id, uptime = entry.uptime, "heartbeat");
                        }
                    }
                }
            }
        });

        Ok(RegistrationHandle { process_id: info.id, stop, registry: self.clone() })
    }

    async fn write(&self, info: &ProcessInfo) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(
            keyspace::process_key(&info.id),
            serde_json::to_string(info)?,
            PROCESS_TTL_SECS,
        )
        .await?;
        Ok(())
    }

    /// All live processes, sorted (type, startedAt) with node first.
    pub async fn list(&self) -> Result<Vec<ProcessInfo>, BrokerError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(keyspace::PROCESS_SCAN_PATTERN).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(raw) = raw {
                match serde_json::from_str::<ProcessInfo>(&raw) {
                    Ok(info) => out.push(info),
                    Err(e) => warn!(key, error = %e, "undecodable registry entry"),
                }
            }
        }
        out.sort_by_key(ProcessInfo::sort_key);
        Ok(out)
    }

    pub async fn deregister(&self, process_id: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keyspace::process_key(process_id)).await?;
        info!(id = process_id, "process deregistered");
        Ok(())
    }
}

impl RegistrationHandle {
    /// Stop the heartbeat and delete the entry.
    pub async fn deregister(self) -> Result<(), BrokerError> {
        self.stop.cancel();
        self.registry.deregister(&self.process_id).await
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        // Entry ages out via TTL; just stop refreshing it.
        self.stop.cancel();
    }
}
