// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered security guards.
//!
//! Inbound text runs content → skill → agent layers in order; the first
//! failure short-circuits. Outbound responses run the echo guard, which
//! verifies the response is not a re-emission of a recently blocked
//! payload. A guard-provider failure blocks inbound (fail closed) and
//! replaces outbound with the canned fallback (fail safe).

pub mod prompts;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::traits::{ChatProvider, Turn};

/// How many blocked payloads the echo guard remembers.
const BLOCKED_MEMORY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardLayer {
    Content,
    Skill,
    Agent,
    Echo,
}

sc_core::simple_display! {
    GuardLayer {
        Content => "content",
        Skill => "skill",
        Agent => "agent",
        Echo => "echo",
    }
}

#[derive(Debug, Clone)]
pub struct GuardVerdict {
    pub passed: bool,
    pub reason: Option<String>,
    pub failed_layer: Option<GuardLayer>,
    pub duration_ms: u64,
}

impl GuardVerdict {
    fn pass(started: Instant) -> Self {
        Self {
            passed: true,
            reason: None,
            failed_layer: None,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn fail(layer: GuardLayer, reason: impl Into<String>, started: Instant) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            failed_layer: Some(layer),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

pub struct Guards {
    provider: Arc<dyn ChatProvider>,
    /// Normalized payloads of recently blocked messages, for the echo guard.
    blocked: Mutex<VecDeque<String>>,
}

impl Guards {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider, blocked: Mutex::new(VecDeque::new()) }
    }

    /// Run the inbound layers in order; first failure wins.
    pub async fn inbound(&self, text: &str) -> GuardVerdict {
        let started = Instant::now();
        let layers = [
            (GuardLayer::Content, prompts::CONTENT_SECURITY),
            (GuardLayer::Skill, prompts::SKILL_SECURITY),
            (GuardLayer::Agent, prompts::AGENT_SECURITY),
        ];
        for (layer, prompt) in layers {
            match self.classify(prompt, text).await {
                Ok(None) => {}
                Ok(Some(reason)) => {
                    warn!(%layer, reason, "inbound message blocked");
                    self.remember_blocked(text);
                    return GuardVerdict::fail(layer, reason, started);
                }
                Err(reason) => {
                    // Fail closed: an unavailable classifier blocks inbound.
                    warn!(%layer, reason, "guard provider failed, blocking inbound");
                    return GuardVerdict::fail(layer, "guard unavailable", started);
                }
            }
        }
        debug!(duration_ms = started.elapsed().as_millis() as u64, "inbound guards passed");
        GuardVerdict::pass(started)
    }

    /// Echo guard: the response must not re-emit a blocked payload.
    pub async fn outbound(&self, response: &str) -> GuardVerdict {
        let started = Instant::now();
        let normalized = normalize(response);
        {
            let blocked = self.blocked.lock();
            if let Some(hit) = blocked.iter().find(|b| is_echo(&normalized, b)) {
                warn!(payload = %truncate(hit), "outbound response echoes a blocked payload");
                return GuardVerdict::fail(GuardLayer::Echo, "blocked payload echo", started);
            }
        }
        match self.classify(prompts::CONTENT_SECURITY, response).await {
            Ok(None) => GuardVerdict::pass(started),
            Ok(Some(reason)) => {
                warn!(reason, "outbound response blocked");
                GuardVerdict::fail(GuardLayer::Echo, reason, started)
            }
            Err(reason) => {
                warn!(reason, "guard provider failed, replacing outbound");
                GuardVerdict::fail(GuardLayer::Echo, "guard unavailable", started)
            }
        }
    }

    /// Run one classifier. `Ok(None)` = safe, `Ok(Some(reason))` = unsafe,
    /// `Err(reason)` = the classifier itself failed.
    async fn classify(&self, prompt: &str, text: &str) -> Result<Option<String>, String> {
        let turns = [Turn::user(text)];
        let abort = CancellationToken::new();
        let response = self
            .provider
            .complete(prompt, &turns, &abort)
            .await
            .map_err(|e| e.to_string())?;
        Ok(parse_verdict(response.text.as_deref().unwrap_or_default()))
    }

    fn remember_blocked(&self, text: &str) {
        let mut blocked = self.blocked.lock();
        blocked.push_back(normalize(text));
        while blocked.len() > BLOCKED_MEMORY {
            blocked.pop_front();
        }
    }
}

/// Parse a classifier reply. Anything that is not an explicit `SAFE` is
/// treated as unsafe with the reply as the reason.
fn parse_verdict(reply: &str) -> Option<String> {
    let line = reply.trim().lines().next().unwrap_or_default().trim();
    if line.eq_ignore_ascii_case("SAFE") {
        return None;
    }
    let reason = line
        .strip_prefix("UNSAFE:")
        .or_else(|| line.strip_prefix("unsafe:"))
        .map(str::trim)
        .unwrap_or(line);
    Some(if reason.is_empty() { "unspecified".to_string() } else { reason.to_string() })
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// A response "echoes" a blocked payload if it reappears verbatim after
/// normalization.
fn is_echo(response: &str, blocked: &str) -> bool {
    !blocked.is_empty() && response.contains(blocked)
}

fn truncate(s: &str) -> String {
    s.chars().take(48).collect()
}

#[cfg(test)]
#[path = "guards_tests.rs"]
mod tests;
