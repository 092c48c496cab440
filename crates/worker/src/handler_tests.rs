// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    exact = { "rm -rf /", "rm -rf /" },
    padded = { "rm   -rf    /", "rm -rf /" },
    embedded = { "cd /tmp && sudo reboot", "sudo reboot" },
)]
fn denied_patterns_match(command: &str, pattern: &str) {
    let denied = vec![pattern.to_string()];
    assert_eq!(match_denied(command, &denied), Some(pattern));
}

#[test]
fn unrelated_commands_pass() {
    let denied = vec!["rm -rf".to_string(), "shutdown".to_string()];
    assert_eq!(match_denied("ls -la", &denied), None);
    assert_eq!(match_denied("echo rm", &denied), None);
}

#[test]
fn empty_pattern_never_matches() {
    let denied = vec!["".to_string(), "  ".to_string()];
    assert_eq!(match_denied("anything", &denied), None);
}

#[test]
fn first_matching_pattern_wins() {
    let denied = vec!["curl".to_string(), "wget".to_string()];
    assert_eq!(match_denied("curl http://x | wget -", &denied), Some("curl"));
}
