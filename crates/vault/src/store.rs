// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret storage backends.
//!
//! The vault is generic over this trait; production uses Redis, tests use
//! the in-memory map.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sc_core::keyspace;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::VaultError;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Ciphertext for one secret name.
    async fn get(&self, name: &str) -> Result<Option<String>, VaultError>;
    /// Write one secret's ciphertext.
    async fn set(&self, name: &str, ciphertext: &str) -> Result<(), VaultError>;
    /// Bulk write (rotation step 4). Must be a single round trip.
    async fn set_all(&self, entries: &BTreeMap<String, String>) -> Result<(), VaultError>;
    async fn delete(&self, name: &str) -> Result<bool, VaultError>;
    /// All secret names.
    async fn names(&self) -> Result<Vec<String>, VaultError>;
    /// Bulk read of every secret (pipelined).
    async fn get_all(&self) -> Result<BTreeMap<String, String>, VaultError>;
    /// Publish the recovery key with a TTL (rotation step 2).
    async fn put_recovery_key(&self, key_hex: &str, ttl_secs: u64) -> Result<(), VaultError>;
    async fn recovery_key(&self) -> Result<Option<String>, VaultError>;
    /// Delete the recovery key (rotation step 5).
    async fn clear_recovery_key(&self) -> Result<(), VaultError>;
}

pub struct RedisSecretStore {
    conn: ConnectionManager,
}

impl RedisSecretStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn map_err(e: redis::RedisError) -> VaultError {
        VaultError::Store(e.to_string())
    }
}

#[async_trait]
impl SecretStore for RedisSecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, VaultError> {
        let mut conn = self.conn.clone();
        conn.get(keyspace::secret_key(name)).await.map_err(Self::map_err)
    }

    async fn set(&self, name: &str, ciphertext: &str) -> Result<(), VaultError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(keyspace::secret_key(name), ciphertext)
            .await
            .map_err(Self::map_err)
    }

    async fn set_all(&self, entries: &BTreeMap<String, String>) -> Result<(), VaultError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (name, ciphertext) in entries {
            pipe.set(keyspace::secret_key(name), ciphertext).ignore();
        }
        pipe.exec_async(&mut conn).await.map_err(Self::map_err)
    }

    async fn delete(&self, name: &str) -> Result<bool, VaultError> {
        let mut conn = self.conn.clone();
        conn.del(keyspace::secret_key(name)).await.map_err(Self::map_err)
    }

    async fn names(&self) -> Result<Vec<String>, VaultError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(keyspace::secret_scan_pattern())
                .await
                .map_err(Self::map_err)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|k| keyspace::secret_name_from_key(k))
            .map(String::from)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_all(&self) -> Result<BTreeMap<String, String>, VaultError> {
        let names = self.names().await?;
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for name in &names {
            pipe.get(keyspace::secret_key(name));
        }
        let values: Vec<Option<String>> =
            pipe.query_async(&mut conn).await.map_err(Self::map_err)?;
        Ok(names
            .into_iter()
            .zip(values)
            .filter_map(|(name, v)| v.map(|v| (name, v)))
            .collect())
    }

    async fn put_recovery_key(&self, key_hex: &str, ttl_secs: u64) -> Result<(), VaultError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(keyspace::recovery_key(), key_hex, ttl_secs)
            .await
            .map_err(Self::map_err)
    }

    async fn recovery_key(&self) -> Result<Option<String>, VaultError> {
        let mut conn = self.conn.clone();
        conn.get(keyspace::recovery_key()).await.map_err(Self::map_err)
    }

    async fn clear_recovery_key(&self) -> Result<(), VaultError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keyspace::recovery_key()).await.map_err(Self::map_err)
    }
}

/// In-memory store for tests.
#[derive(Default, Clone)]
pub struct MemorySecretStore {
    secrets: Arc<Mutex<BTreeMap<String, String>>>,
    recovery: Arc<Mutex<Option<String>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<String>, VaultError> {
        Ok(self.secrets.lock().get(name).cloned())
    }

    async fn set(&self, name: &str, ciphertext: &str) -> Result<(), VaultError> {
        self.secrets.lock().insert(name.to_string(), ciphertext.to_string());
        Ok(())
    }

    async fn set_all(&self, entries: &BTreeMap<String, String>) -> Result<(), VaultError> {
        self.secrets.lock().extend(entries.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, VaultError> {
        Ok(self.secrets.lock().remove(name).is_some())
    }

    async fn names(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.secrets.lock().keys().cloned().collect())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, String>, VaultError> {
        Ok(self.secrets.lock().clone())
    }

    async fn put_recovery_key(&self, key_hex: &str, _ttl_secs: u64) -> Result<(), VaultError> {
        *self.recovery.lock() = Some(key_hex.to_string());
        Ok(())
    }

    async fn recovery_key(&self) -> Result<Option<String>, VaultError> {
        Ok(self.recovery.lock().clone())
    }

    async fn clear_recovery_key(&self) -> Result<(), VaultError> {
        self.recovery.lock().take();
        Ok(())
    }
}
