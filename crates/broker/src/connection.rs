// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis connection bootstrap.
//!
//! One multiplexed [`ConnectionManager`] per process carries all commands;
//! pub/sub subscribers need their own dedicated connections and get them
//! from the retained [`redis::Client`].

use redis::aio::ConnectionManager;
use sc_core::config::RedisConfig;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::BrokerError;

/// How long bootstrap keeps retrying before declaring Redis unreachable.
const BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(30);
const BOOTSTRAP_RETRY: Duration = Duration::from_secs(2);

/// Connect with bounded retry. Fatal-at-boot when the deadline passes.
pub async fn connect(config: &RedisConfig) -> Result<ConnectionManager, BrokerError> {
    let url = config.url();
    let client = redis::Client::open(url.as_str())?;
    let deadline = tokio::time::Instant::now() + BOOTSTRAP_DEADLINE;

    loop {
        match client.get_connection_manager().await {
            Ok(conn) => {
                info!(host = %config.host, port = config.port, "connected to redis");
                return Ok(conn);
            }
            Err(e) if tokio::time::Instant::now() < deadline => {
                warn!(error = %e, "redis not ready, retrying");
                tokio::time::sleep(BOOTSTRAP_RETRY).await;
            }
            Err(e) => return Err(BrokerError::Bootstrap(e.to_string())),
        }
    }
}

/// A client handle for opening dedicated pub/sub connections.
pub fn subscriber_client(config: &RedisConfig) -> Result<redis::Client, BrokerError> {
    Ok(redis::Client::open(config.url().as_str())?)
}
