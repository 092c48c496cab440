// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-window rate limiter over Redis counters.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace;

use crate::error::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// INCR + EXPIRE-on-first-hit per scope key. After the window elapses the
/// counter expires and the full budget is available again.
#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    max: u64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager, max: u64, window_secs: u64) -> Self {
        Self { conn, max, window_secs: window_secs.max(1) }
    }

    pub async fn check(&self, scope: &str) -> Result<RateDecision, BrokerError> {
        let mut conn = self.conn.clone();
        let key = keyspace::ratelimit_key(scope);
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(&key, self.window_secs as i64).await?;
        }
        if count <= self.max {
            return Ok(RateDecision::Allowed);
        }
        let ttl: i64 = conn.ttl(&key).await?;
        Ok(decide_over_budget(ttl, self.window_secs))
    }
}

/// Over-budget decision from the key's remaining TTL. A missing or
/// persistent TTL falls back to the full window.
fn decide_over_budget(ttl: i64, window_secs: u64) -> RateDecision {
    let retry_after_secs = if ttl > 0 { ttl as u64 } else { window_secs };
    RateDecision::Limited { retry_after_secs }
}

#[cfg(test)]
#[path = "ratelimit_tests.rs"]
mod tests;
