// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent skill dependency installation.
//!
//! A fingerprint over the install command and the detected language's dep
//! files is compared against a marker file; matching fingerprints skip the
//! install entirely. Concurrent callers for the same skill dir are
//! single-flighted.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::WorkerError;
use crate::exec::{spawn_process, EnvMode, ExecSpec};

/// Marker file recording the installed fingerprint.
pub const INSTALL_MARKER: &str = ".scalyclaw-installed";
/// Installs get a generous budget; they run once per dep change.
const INSTALL_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLang {
    Python,
    Node,
    Rust,
    Go,
}

impl SkillLang {
    /// The runtime binary that must be on PATH.
    pub fn runtime(&self) -> &'static str {
        match self {
            SkillLang::Python => "python3",
            SkillLang::Node => "node",
            SkillLang::Rust => "cargo",
            SkillLang::Go => "go",
        }
    }

    /// Dependency files whose contents feed the fingerprint.
    pub fn dep_files(&self) -> &'static [&'static str] {
        match self {
            SkillLang::Python => &["requirements.txt", "pyproject.toml"],
            SkillLang::Node => &["package.json", "package-lock.json"],
            SkillLang::Rust => &["Cargo.toml", "Cargo.lock"],
            SkillLang::Go => &["go.mod", "go.sum"],
        }
    }
}

/// Detect the skill's language from its dep files.
pub fn detect_language(dir: &Path) -> Option<SkillLang> {
    for lang in [SkillLang::Python, SkillLang::Node, SkillLang::Rust, SkillLang::Go] {
        if lang.dep_files().iter().any(|f| dir.join(f).exists()) {
            return Some(lang);
        }
    }
    None
}

/// SHA-256 over the install command and every present dep file.
pub fn fingerprint(install_command: &str, dir: &Path, lang: Option<SkillLang>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(install_command.as_bytes());
    if let Some(lang) = lang {
        for name in lang.dep_files() {
            if let Ok(contents) = std::fs::read(dir.join(name)) {
                hasher.update(name.as_bytes());
                hasher.update(&contents);
            }
        }
    }
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[derive(Default)]
pub struct Installer {
    flights: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl Installer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a skill's dependencies are installed. A second call with
    /// unchanged dep files and install command is a no-op past the marker
    /// read; concurrent calls for the same dir install exactly once.
    pub async fn ensure_installed(
        &self,
        skill_id: &str,
        dir: &Path,
        install_command: Option<&str>,
        lang_hint: Option<SkillLang>,
    ) -> Result<(), WorkerError> {
        let Some(command) = install_command else {
            return Ok(());
        };

        let flight = self.flight_for(dir);
        let _guard = flight.lock().await;

        let lang = lang_hint.or_else(|| detect_language(dir));
        let wanted = fingerprint(command, dir, lang);
        let marker = dir.join(INSTALL_MARKER);
        if let Ok(existing) = std::fs::read_to_string(&marker) {
            if existing.trim() == wanted {
                debug!(skill = skill_id, "install fingerprint unchanged, skipping");
                return Ok(());
            }
        }

        if let Some(lang) = lang {
            let runtime = lang.runtime();
            which::which(runtime)
                .map_err(|_| WorkerError::RuntimeMissing(runtime.to_string()))?;
            if lang == SkillLang::Python {
                self.ensure_venv(skill_id, dir).await?;
            }
        }

        info!(skill = skill_id, command, "installing skill dependencies");
        // Installs run with the minimal env allowlist; only skill runs see
        // the job's secrets.
        let spec = ExecSpec::shell(command, dir)
            .env_mode(EnvMode::Minimal)
            .timeout_ms(INSTALL_TIMEOUT_MS);
        let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await?;
        if outcome.exit_code != 0 {
            return Err(WorkerError::Install {
                skill: skill_id.to_string(),
                reason: truncate_reason(&outcome.stderr),
            });
        }

        std::fs::write(&marker, &wanted)?;
        info!(skill = skill_id, "install complete");
        Ok(())
    }

    async fn ensure_venv(&self, skill_id: &str, dir: &Path) -> Result<(), WorkerError> {
        if dir.join(".venv").is_dir() {
            return Ok(());
        }
        let spec = ExecSpec::shell("python3 -m venv .venv", dir)
            .env_mode(EnvMode::Minimal)
            .timeout_ms(INSTALL_TIMEOUT_MS);
        let outcome = spawn_process(spec, &CancellationToken::new(), |_| {}).await?;
        if outcome.exit_code != 0 {
            return Err(WorkerError::Install {
                skill: skill_id.to_string(),
                reason: format!("venv creation failed: {}", truncate_reason(&outcome.stderr)),
            });
        }
        Ok(())
    }

    fn flight_for(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock();
        Arc::clone(flights.entry(dir.to_path_buf()).or_default())
    }
}

fn truncate_reason(stderr: &str) -> String {
    const MAX: usize = 2_000;
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
