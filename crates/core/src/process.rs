// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process registry entries, refreshed by heartbeat under `process:{id}`.

use serde::{Deserialize, Serialize};

/// Registered process kinds, in display order: node < worker < dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    Node,
    Worker,
    Dashboard,
}

crate::simple_display! {
    ProcessType {
        Node => "node",
        Worker => "worker",
        Dashboard => "dashboard",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    pub host: String,
    pub port: u16,
    pub hostname: String,
    pub started_at: u64,
    pub uptime: u64,
    pub version: String,
    pub concurrency: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub tls: bool,
}

impl ProcessInfo {
    /// Sort key for registry listings: type first, then start time.
    pub fn sort_key(&self) -> (ProcessType, u64) {
        (self.process_type, self.started_at)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
