// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The vault: store/resolve/rotate over a [`SecretStore`].

use parking_lot::Mutex;
use sc_core::keyspace::RECOVERY_KEY_TTL_SECS;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::cipher::{decrypt, encrypt};
use crate::error::VaultError;
use crate::keyfile::Keyfile;
use crate::store::SecretStore;

/// How long a bulk resolution stays cached. Amortizes decryption across
/// the many subprocess spawns that inject secrets.
const BULK_CACHE_TTL: Duration = Duration::from_secs(30);

struct BulkCache {
    resolved: BTreeMap<String, String>,
    at: Instant,
}

pub struct Vault {
    store: Arc<dyn SecretStore>,
    keyfile: Keyfile,
    bulk: Mutex<Option<BulkCache>>,
}

impl Vault {
    pub fn new(store: Arc<dyn SecretStore>, keyfile: Keyfile) -> Self {
        Self { store, keyfile, bulk: Mutex::new(None) }
    }

    /// Encrypt and store one secret.
    pub async fn store(&self, name: &str, plaintext: &str) -> Result<(), VaultError> {
        let key = self.keyfile.derive()?;
        let wire = encrypt(&key, plaintext)?;
        self.store.set(name, &wire).await?;
        self.bulk.lock().take();
        Ok(())
    }

    /// Resolve one secret; falls back to the recovery key when a rotation
    /// is in flight.
    pub async fn resolve(&self, name: &str) -> Result<Option<String>, VaultError> {
        let Some(wire) = self.store.get(name).await? else {
            return Ok(None);
        };
        let key = self.keyfile.derive()?;
        match decrypt(&key, &wire) {
            Ok(plain) => Ok(Some(plain)),
            Err(_) => match self.try_recovery(&wire).await? {
                Some(plain) => Ok(Some(plain)),
                None => Err(VaultError::DecryptFailed),
            },
        }
    }

    /// Resolve every secret. Decrypt failures drop that secret (logged),
    /// never a substituted value. Results are cached briefly.
    pub async fn resolve_all(&self) -> Result<BTreeMap<String, String>, VaultError> {
        if let Some(cache) = self.bulk.lock().as_ref() {
            if cache.at.elapsed() < BULK_CACHE_TTL {
                return Ok(cache.resolved.clone());
            }
        }

        let all = self.store.get_all().await?;
        let key = self.keyfile.derive()?;
        let recovery = self.recovery_derived().await?;

        let mut resolved = BTreeMap::new();
        for (name, wire) in all {
            match decrypt(&key, &wire) {
                Ok(plain) => {
                    resolved.insert(name, plain);
                }
                Err(_) => match recovery.as_ref().map(|k| decrypt(k, &wire)) {
                    Some(Ok(plain)) => {
                        resolved.insert(name, plain);
                    }
                    _ => warn!(secret = %name, "dropping undecryptable secret from bulk resolve"),
                },
            }
        }

        *self.bulk.lock() = Some(BulkCache { resolved: resolved.clone(), at: Instant::now() });
        Ok(resolved)
    }

    pub async fn list(&self) -> Result<Vec<String>, VaultError> {
        self.store.names().await
    }

    pub async fn delete(&self, name: &str) -> Result<bool, VaultError> {
        let removed = self.store.delete(name).await?;
        self.bulk.lock().take();
        Ok(removed)
    }

    /// Rotate the vault key. Atomic with respect to concurrent resolves:
    ///
    /// 1. decrypt everything under the current key;
    /// 2. publish the current derived key to the recovery slot (short TTL);
    /// 3. atomically replace the password file and derive the new key;
    /// 4. re-encrypt all plaintexts under the new key in one pipeline;
    /// 5. clear the recovery slot and local caches.
    ///
    /// A reader that loads an old ciphertext after step 3 decrypts it via
    /// the recovery slot published in step 2.
    pub async fn rotate(&self) -> Result<usize, VaultError> {
        let old_key = self.keyfile.derive()?;
        let all = self.store.get_all().await?;
        let mut plains = BTreeMap::new();
        for (name, wire) in &all {
            match decrypt(&old_key, wire) {
                Ok(plain) => {
                    plains.insert(name.clone(), plain);
                }
                Err(_) => {
                    warn!(secret = %name, "skipping undecryptable secret during rotation")
                }
            }
        }

        self.store.put_recovery_key(&hex::encode(old_key), RECOVERY_KEY_TTL_SECS).await?;

        self.keyfile.replace(&Keyfile::fresh_password())?;
        let new_key = self.keyfile.derive()?;

        let mut reencrypted = BTreeMap::new();
        for (name, plain) in &plains {
            reencrypted.insert(name.clone(), encrypt(&new_key, plain)?);
        }
        self.store.set_all(&reencrypted).await?;

        self.store.clear_recovery_key().await?;
        self.keyfile.invalidate();
        self.bulk.lock().take();
        info!(count = reencrypted.len(), "vault key rotated");
        Ok(reencrypted.len())
    }

    async fn try_recovery(&self, wire: &str) -> Result<Option<String>, VaultError> {
        match self.recovery_derived().await? {
            Some(key) => Ok(decrypt(&key, wire).ok()),
            None => Ok(None),
        }
    }

    async fn recovery_derived(&self) -> Result<Option<[u8; 32]>, VaultError> {
        let Some(hex_key) = self.store.recovery_key().await? else {
            return Ok(None);
        };
        let bytes = hex::decode(&hex_key).map_err(|_| VaultError::Malformed)?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| VaultError::Malformed)?;
        Ok(Some(key))
    }
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
