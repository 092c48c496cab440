// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Skill bundle cache: fetch-on-miss from the node, per-skill single-flight,
//! reload-signal invalidation.

use futures_util::StreamExt;
use parking_lot::Mutex;
use sc_core::keyspace::SKILLS_RELOAD_CHANNEL;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WorkerError;
use crate::install::SkillLang;
use sc_core::paths::resolve_under;

/// Bundle metadata, `skill.json` at the bundle root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<SkillLang>,
    /// Shell command that installs dependencies, run from the bundle dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,
    /// Shell command that runs the skill; JSON on stdin, JSON on stdout.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub id: String,
    pub dir: PathBuf,
    pub manifest: SkillManifest,
}

pub struct SkillCache {
    entries: Mutex<HashMap<String, Arc<Skill>>>,
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    http: reqwest::Client,
    node_url: String,
    auth_token: String,
    root: PathBuf,
}

impl SkillCache {
    pub fn new(node_url: String, auth_token: String, root: PathBuf) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            node_url: node_url.trim_end_matches('/').to_string(),
            auth_token,
            root,
        }
    }

    /// Get a skill, fetching and unpacking its bundle on first use.
    pub async fn get(&self, skill_id: &str) -> Result<Arc<Skill>, WorkerError> {
        if let Some(skill) = self.entries.lock().get(skill_id) {
            return Ok(Arc::clone(skill));
        }

        let flight = self.flight_for(skill_id);
        let _guard = flight.lock().await;
        if let Some(skill) = self.entries.lock().get(skill_id) {
            return Ok(Arc::clone(skill));
        }

        // Skill ids come from job payloads; containment applies to them too.
        let dir = resolve_under(&self.root, skill_id)?;

        let skill = if dir.join("skill.json").exists() {
            debug!(skill = skill_id, "bundle already on disk");
            self.load(skill_id, &dir)?
        } else {
            self.fetch_and_unpack(skill_id, &dir).await?;
            self.load(skill_id, &dir)?
        };

        let skill = Arc::new(skill);
        self.entries.lock().insert(skill_id.to_string(), Arc::clone(&skill));
        Ok(skill)
    }

    /// Drop every cached entry (reload signal).
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        if dropped > 0 {
            info!(dropped, "skill cache cleared");
        }
    }

    fn load(&self, skill_id: &str, dir: &Path) -> Result<Skill, WorkerError> {
        let raw = std::fs::read_to_string(dir.join("skill.json"))
            .map_err(|e| WorkerError::Bundle(format!("{skill_id}: skill.json unreadable: {e}")))?;
        let manifest: SkillManifest = serde_json::from_str(&raw)
            .map_err(|e| WorkerError::Bundle(format!("{skill_id}: bad skill.json: {e}")))?;
        Ok(Skill { id: skill_id.to_string(), dir: dir.to_path_buf(), manifest })
    }

    async fn fetch_and_unpack(&self, skill_id: &str, dir: &Path) -> Result<(), WorkerError> {
        let url = format!("{}/api/skills/{}/zip", self.node_url, skill_id);
        info!(skill = skill_id, url, "fetching skill bundle");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| WorkerError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(WorkerError::Fetch(format!(
                "{skill_id}: node returned {}",
                response.status()
            )));
        }
        let bytes =
            response.bytes().await.map_err(|e| WorkerError::Fetch(e.to_string()))?.to_vec();

        let dir = dir.to_path_buf();
        let skill = skill_id.to_string();
        tokio::task::spawn_blocking(move || unpack_zip(&bytes, &dir, &skill))
            .await
            .map_err(|e| WorkerError::Bundle(e.to_string()))??;
        Ok(())
    }

    fn flight_for(&self, skill_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock();
        Arc::clone(flights.entry(skill_id.to_string()).or_default())
    }
}

/// Unpack a zip bundle under `dir`, rejecting entries that escape it.
fn unpack_zip(bytes: &[u8], dir: &Path, skill_id: &str) -> Result<(), WorkerError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| WorkerError::Bundle(format!("{skill_id}: {e}")))?;
    std::fs::create_dir_all(dir)?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| WorkerError::Bundle(format!("{skill_id}: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(WorkerError::Bundle(format!(
                "{skill_id}: entry '{}' escapes the bundle",
                entry.name()
            )));
        };
        let target = dir.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        std::fs::write(&target, contents)?;
    }
    Ok(())
}

/// Clear the cache whenever a skills-reload signal arrives.
pub async fn run_reload_subscriber(
    client: redis::Client,
    cache: Arc<SkillCache>,
    shutdown: CancellationToken,
) {
    let mut pubsub = match client.get_async_pubsub().await {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "skills reload subscriber failed to connect");
            return;
        }
    };
    if let Err(e) = pubsub.subscribe(SKILLS_RELOAD_CHANNEL).await {
        warn!(error = %e, "skills reload subscribe failed");
        return;
    }
    let mut stream = pubsub.into_on_message();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = stream.next() => {
                if msg.is_none() {
                    break;
                }
                cache.clear();
            }
        }
    }
}

#[cfg(test)]
#[path = "skills_tests.rs"]
mod tests;
