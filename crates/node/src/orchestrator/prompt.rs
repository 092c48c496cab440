// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System prompt assembly with in-process caching.
//!
//! Composition: user-editable identity files, fixed architecture sections,
//! and dynamic lists of registered skills, agents, and connected MCP
//! servers. Reload signals invalidate the cache.

use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::debug;

/// Identity files the `/api/mind` surface may touch, in prompt order.
pub const IDENTITY_FILES: [&str; 3] = ["identity.md", "style.md", "goals.md"];

const ARCHITECTURE: &str = "\
## Runtime\n\
You are ScalyClaw, a personal assistant. Long-running work (shell commands, \
skills, delegated agents) executes on remote workers; you dispatch it with \
tool calls and narrate progress. Keep replies for the active chat channel.";

pub struct PromptCache {
    mind_dir: PathBuf,
    skills_dir: PathBuf,
    agents: Mutex<Vec<String>>,
    mcp_servers: Mutex<Vec<String>>,
    cached: Mutex<Option<String>>,
}

impl PromptCache {
    pub fn new(mind_dir: PathBuf, skills_dir: PathBuf) -> Self {
        Self {
            mind_dir,
            skills_dir,
            agents: Mutex::new(Vec::new()),
            mcp_servers: Mutex::new(Vec::new()),
            cached: Mutex::new(None),
        }
    }

    /// The assembled system prompt, rebuilt only after invalidation.
    pub fn assemble(&self) -> String {
        if let Some(cached) = self.cached.lock().as_ref() {
            return cached.clone();
        }

        let mut sections = Vec::new();
        for name in IDENTITY_FILES {
            if let Ok(contents) = std::fs::read_to_string(self.mind_dir.join(name)) {
                let trimmed = contents.trim();
                if !trimmed.is_empty() {
                    sections.push(trimmed.to_string());
                }
            }
        }
        sections.push(ARCHITECTURE.to_string());

        let skills = self.list_skills();
        if !skills.is_empty() {
            sections.push(format!("## Skills\nAvailable skills: {}", skills.join(", ")));
        }
        let agents = self.agents.lock();
        if !agents.is_empty() {
            sections.push(format!("## Agents\nDelegable agents: {}", agents.join(", ")));
        }
        let mcp = self.mcp_servers.lock();
        if !mcp.is_empty() {
            sections.push(format!("## MCP\nConnected MCP servers: {}", mcp.join(", ")));
        }

        let prompt = sections.join("\n\n");
        *self.cached.lock() = Some(prompt.clone());
        debug!(bytes = prompt.len(), "system prompt assembled");
        prompt
    }

    /// Invalidate on config / skill / agent / MCP reload.
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }

    pub fn set_agents(&self, agents: Vec<String>) {
        *self.agents.lock() = agents;
        self.invalidate();
    }

    pub fn set_mcp_servers(&self, servers: Vec<String>) {
        *self.mcp_servers.lock() = servers;
        self.invalidate();
    }

    fn list_skills(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.skills_dir) else {
            return Vec::new();
        };
        let mut skills: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().join("skill.json").exists())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        skills.sort();
        skills
    }
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
