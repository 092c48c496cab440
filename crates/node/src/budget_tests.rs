// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::traits::fakes::MemoryUsageStore;
use crate::traits::TokenUsage;

fn budget_with(daily: u64, monthly: u64) -> (Budget, MemoryUsageStore) {
    let store = MemoryUsageStore::default();
    let config = BudgetConfig {
        daily_token_limit: daily,
        monthly_token_limit: monthly,
        soft_threshold: 0.8,
    };
    (Budget::new(config, Arc::new(store.clone())), store)
}

#[tokio::test]
async fn under_budget_is_allowed() {
    let (budget, store) = budget_with(1_000, 10_000);
    store
        .record(TokenUsage { input_tokens: 100, output_tokens: 50 })
        .await
        .unwrap();
    assert_eq!(budget.check().await.unwrap(), BudgetDecision::Allowed);
}

#[tokio::test]
async fn daily_hard_limit_blocks() {
    let (budget, store) = budget_with(100, 10_000);
    store
        .record(TokenUsage { input_tokens: 80, output_tokens: 20 })
        .await
        .unwrap();
    assert!(matches!(
        budget.check().await.unwrap(),
        BudgetDecision::Blocked { reason } if reason.contains("daily")
    ));
}

#[tokio::test]
async fn monthly_hard_limit_blocks() {
    let (budget, store) = budget_with(1_000_000, 100);
    store
        .record(TokenUsage { input_tokens: 100, output_tokens: 0 })
        .await
        .unwrap();
    assert!(matches!(
        budget.check().await.unwrap(),
        BudgetDecision::Blocked { reason } if reason.contains("monthly")
    ));
}

#[tokio::test]
async fn soft_threshold_does_not_block() {
    let (budget, store) = budget_with(100, 10_000);
    store
        .record(TokenUsage { input_tokens: 85, output_tokens: 0 })
        .await
        .unwrap();
    // 85% of daily: above the 80% soft threshold but below the hard limit.
    assert_eq!(budget.check().await.unwrap(), BudgetDecision::Allowed);
}
