// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    live_ttl = { 42, 60, 42 },
    expired_ttl = { -1, 60, 60 },
    missing_ttl = { -2, 60, 60 },
)]
fn over_budget_retry_after(ttl: i64, window: u64, expected: u64) {
    assert_eq!(
        decide_over_budget(ttl, window),
        RateDecision::Limited { retry_after_secs: expected }
    );
}

#[test]
fn allowed_is_allowed() {
    assert!(RateDecision::Allowed.is_allowed());
    assert!(!RateDecision::Limited { retry_after_secs: 1 }.is_allowed());
}
