// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("encode/decode error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("job {0} is active and cannot be removed")]
    ActiveJob(String),

    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Schedule(#[from] sc_core::schedule::ScheduleError),

    #[error("redis unreachable at bootstrap: {0}")]
    Bootstrap(String),
}

impl BrokerError {
    /// True for errors worth a job-level retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Redis(_))
    }
}
