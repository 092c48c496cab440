// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("broker error: {0}")]
    Broker(#[from] sc_broker::BrokerError),

    #[error("vault error: {0}")]
    Vault(#[from] sc_vault::VaultError),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Schedule(#[from] sc_core::ScheduleError),

    #[error("scheduled job {0} not found")]
    ScheduledJobNotFound(String),

    #[error("budget exhausted: {0}")]
    BudgetExceeded(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode/decode error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

impl NodeError {
    /// Cancellation is not an error; transient failures are retried at the
    /// job level.
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::Broker(_) | NodeError::Provider(_) | NodeError::Store(_))
    }
}
