// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token budget enforcement: hard limits block provider calls, soft
//! thresholds alert once per window.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::error::NodeError;
use crate::traits::{UsageStore, UsageTotals};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetConfig {
    pub daily_token_limit: u64,
    pub monthly_token_limit: u64,
    /// Fraction of a hard limit that triggers the one-shot soft alert.
    pub soft_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_token_limit: 2_000_000,
            monthly_token_limit: 40_000_000,
            soft_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetDecision {
    Allowed,
    Blocked { reason: String },
}

#[derive(Default)]
struct AlertState {
    daily_alerted: bool,
    monthly_alerted: bool,
}

pub struct Budget {
    config: BudgetConfig,
    usage: Arc<dyn UsageStore>,
    alerts: Mutex<AlertState>,
}

impl Budget {
    pub fn new(config: BudgetConfig, usage: Arc<dyn UsageStore>) -> Self {
        Self { config, usage, alerts: Mutex::new(AlertState::default()) }
    }

    /// Consulted before every provider call.
    pub async fn check(&self) -> Result<BudgetDecision, NodeError> {
        let totals = self.usage.totals().await?;
        Ok(self.decide(totals))
    }

    fn decide(&self, totals: UsageTotals) -> BudgetDecision {
        if totals.daily_tokens >= self.config.daily_token_limit {
            return BudgetDecision::Blocked {
                reason: format!(
                    "daily token limit reached ({}/{})",
                    totals.daily_tokens, self.config.daily_token_limit
                ),
            };
        }
        if totals.monthly_tokens >= self.config.monthly_token_limit {
            return BudgetDecision::Blocked {
                reason: format!(
                    "monthly token limit reached ({}/{})",
                    totals.monthly_tokens, self.config.monthly_token_limit
                ),
            };
        }

        let daily_soft =
            (self.config.daily_token_limit as f64 * self.config.soft_threshold) as u64;
        let monthly_soft =
            (self.config.monthly_token_limit as f64 * self.config.soft_threshold) as u64;
        let mut alerts = self.alerts.lock();
        if totals.daily_tokens >= daily_soft && !alerts.daily_alerted {
            alerts.daily_alerted = true;
            warn!(
                used = totals.daily_tokens,
                limit = self.config.daily_token_limit,
                "daily token budget soft threshold crossed"
            );
        }
        if totals.monthly_tokens >= monthly_soft && !alerts.monthly_alerted {
            alerts.monthly_alerted = true;
            warn!(
                used = totals.monthly_tokens,
                limit = self.config.monthly_token_limit,
                "monthly token budget soft threshold crossed"
            );
        }
        BudgetDecision::Allowed
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub async fn totals(&self) -> Result<UsageTotals, NodeError> {
        self.usage.totals().await
    }
}

#[cfg(test)]
#[path = "budget_tests.rs"]
mod tests;
