// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Setup and worker configuration files, with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("setup config not found at {0} (run setup first)")]
    Missing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not determine home directory")]
    NoHome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: bool,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { host: default_redis_host(), port: default_redis_port(), password: None, tls: false }
    }
}

impl RedisConfig {
    /// Connection URL for the redis client, `rediss://` when TLS is on.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        match &self.password {
            Some(password) => format!("{scheme}://:{password}@{}:{}", self.host, self.port),
            None => format!("{scheme}://{}:{}", self.host, self.port),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("REDIS_HOST") {
            self.host = host;
        }
        if let Some(port) = std::env::var("REDIS_PORT").ok().and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            self.password = Some(password);
        }
        if let Ok(tls) = std::env::var("REDIS_TLS") {
            self.tls = matches!(tls.as_str(), "1" | "true" | "yes");
        }
    }
}

/// Install-wide setup, at `~/.scalyclaw/scalyclaw.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupConfig {
    pub home_dir: PathBuf,
    #[serde(default)]
    pub redis: RedisConfig,
}

impl SetupConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".scalyclaw").join("scalyclaw.json"))
    }

    /// Load from the default path. Missing config is fatal-at-boot.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let mut config: SetupConfig = serde_json::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.redis.apply_env();
        Ok(config)
    }

    /// The vault password file, owned by the node.
    pub fn password_file(&self) -> PathBuf {
        self.home_dir.join("scalyclaw.ps")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.home_dir.join("skills")
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.home_dir.join("workspace")
    }

    pub fn worker_config_path(&self) -> PathBuf {
        self.home_dir.join("worker.json")
    }
}

/// Per-worker settings, at `{home}/worker.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSettings {
    pub node_url: String,
    pub auth_token: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default = "default_worker_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
}

fn default_concurrency() -> u32 {
    2
}

fn default_worker_port() -> u16 {
    4200
}

impl WorkerSettings {
    /// Load worker settings; `SCALYCLAW_WORKER_CONFIG` overrides the path,
    /// `SCALYCLAW_WORKER_CONCURRENCY` the concurrency.
    pub fn load(setup: &SetupConfig) -> Result<Self, ConfigError> {
        let path = match std::env::var("SCALYCLAW_WORKER_CONFIG") {
            Ok(p) => PathBuf::from(p),
            Err(_) => setup.worker_config_path(),
        };
        if !path.exists() {
            return Err(ConfigError::Missing(path));
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        let mut settings: WorkerSettings =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
        if let Some(n) = std::env::var("SCALYCLAW_WORKER_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            settings.concurrency = n;
        }
        Ok(settings)
    }

    pub fn workspace(&self, setup: &SetupConfig) -> PathBuf {
        self.workspace_dir.clone().unwrap_or_else(|| setup.workspace_dir())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
