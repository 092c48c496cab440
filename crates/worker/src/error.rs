// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(#[from] sc_broker::BrokerError),

    #[error("skill fetch failed: {0}")]
    Fetch(String),

    #[error("bad skill bundle: {0}")]
    Bundle(String),

    #[error(transparent)]
    Path(#[from] sc_core::PathError),

    #[error("required runtime '{0}' not found on PATH")]
    RuntimeMissing(String),

    #[error("install failed for skill '{skill}': {reason}")]
    Install { skill: String, reason: String },

    #[error("encode/decode error: {0}")]
    Serde(#[from] serde_json::Error),
}
