// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The vault password file and scrypt key derivation.
//!
//! The file lives at `{home}/scalyclaw.ps`, is created atomically with mode
//! 0600 if absent, and is owned by the node: workers never read it. The
//! derived key is cached against the file's mtime so the many subprocess
//! spawns that need secrets do not re-run scrypt.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

use crate::error::VaultError;

/// Fixed derivation salt; rotation changes the file contents, not the salt.
const SALT: &[u8] = b"scalyclaw-vault-v1";

/// scrypt parameters: N=2^15, r=8, p=1.
const LOG_N: u8 = 15;
const R: u32 = 8;
const P: u32 = 1;

struct CachedKey {
    mtime: SystemTime,
    key: [u8; 32],
}

pub struct Keyfile {
    path: PathBuf,
    cache: Mutex<Option<CachedKey>>,
}

impl Keyfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cache: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the password file with fresh random contents if absent.
    /// Missing parent directories are created; the write is temp + rename.
    pub fn ensure(&self) -> Result<(), VaultError> {
        if self.path.exists() {
            return Ok(());
        }
        let password = hex::encode(random_bytes(48));
        self.replace(&password)?;
        info!(path = %self.path.display(), "created vault password file");
        Ok(())
    }

    /// Atomically replace the file contents (rotation step 3).
    pub fn replace(&self, password: &str) -> Result<(), VaultError> {
        let parent = self.path.parent().ok_or_else(|| VaultError::Keyfile {
            path: self.path.clone(),
            reason: "no parent directory".into(),
        })?;
        std::fs::create_dir_all(parent)?;

        let tmp = self.path.with_extension("ps.tmp");
        std::fs::write(&tmp, password)?;
        set_owner_only(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        self.cache.lock().take();
        Ok(())
    }

    /// Derive (or fetch from cache) the 32-byte key for the current file.
    /// A missing or unreadable file is fatal.
    pub fn derive(&self) -> Result<[u8; 32], VaultError> {
        let meta = std::fs::metadata(&self.path).map_err(|e| VaultError::Keyfile {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let mtime = meta.modified()?;

        if let Some(cached) = self.cache.lock().as_ref() {
            if cached.mtime == mtime {
                return Ok(cached.key);
            }
        }

        let password = std::fs::read(&self.path).map_err(|e| VaultError::Keyfile {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let key = derive_key(&password)?;
        *self.cache.lock() = Some(CachedKey { mtime, key });
        Ok(key)
    }

    /// Drop the cached key (rotation step 5).
    pub fn invalidate(&self) {
        self.cache.lock().take();
    }

    /// Generate a fresh random password (rotation input).
    pub fn fresh_password() -> String {
        hex::encode(random_bytes(48))
    }
}

/// scrypt(password, fixed salt) → 32 bytes.
pub fn derive_key(password: &[u8]) -> Result<[u8; 32], VaultError> {
    let params = scrypt::Params::new(LOG_N, R, P, 32).map_err(|e| VaultError::Keyfile {
        path: PathBuf::new(),
        reason: e.to_string(),
    })?;
    let mut key = [0u8; 32];
    scrypt::scrypt(password, SALT, &params, &mut key).map_err(|e| VaultError::Keyfile {
        path: PathBuf::new(),
        reason: e.to_string(),
    })?;
    Ok(key)
}

fn random_bytes(n: usize) -> Vec<u8> {
    use aes_gcm::aead::rand_core::RngCore;
    let mut buf = vec![0u8; n];
    aes_gcm::aead::OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<(), VaultError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<(), VaultError> {
    Ok(())
}

#[cfg(test)]
#[path = "keyfile_tests.rs"]
mod tests;
