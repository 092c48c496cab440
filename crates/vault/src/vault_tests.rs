// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::MemorySecretStore;

fn vault_in(dir: &tempfile::TempDir) -> (Vault, Arc<MemorySecretStore>) {
    let store = Arc::new(MemorySecretStore::new());
    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    keyfile.ensure().unwrap();
    (Vault::new(store.clone(), keyfile), store)
}

#[tokio::test]
async fn store_then_resolve_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("openai", "sk-123").await.unwrap();
    assert_eq!(vault.resolve("openai").await.unwrap(), Some("sk-123".to_string()));
}

#[tokio::test]
async fn resolve_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    assert_eq!(vault.resolve("nope").await.unwrap(), None);
}

#[tokio::test]
async fn list_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("a", "1").await.unwrap();
    vault.store("b", "2").await.unwrap();
    assert_eq!(vault.list().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    assert!(vault.delete("a").await.unwrap());
    assert!(!vault.delete("a").await.unwrap());
    assert_eq!(vault.list().await.unwrap(), vec!["b".to_string()]);
}

#[tokio::test]
async fn resolve_all_returns_every_secret() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("x", "1").await.unwrap();
    vault.store("y", "2").await.unwrap();
    let all = vault.resolve_all().await.unwrap();
    assert_eq!(all.get("x").map(String::as_str), Some("1"));
    assert_eq!(all.get("y").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn corrupt_secret_is_dropped_from_bulk_not_substituted() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, store) = vault_in(&dir);
    vault.store("good", "v").await.unwrap();
    store.set("bad", "aa:bb:cc").await.unwrap();
    let all = vault.resolve_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all.contains_key("good"));
    assert!(!all.contains_key("bad"));
}

#[tokio::test]
async fn rotation_preserves_all_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("a", "alpha").await.unwrap();
    vault.store("b", "beta").await.unwrap();

    let rotated = vault.rotate().await.unwrap();
    assert_eq!(rotated, 2);

    assert_eq!(vault.resolve("a").await.unwrap(), Some("alpha".to_string()));
    assert_eq!(vault.resolve("b").await.unwrap(), Some("beta".to_string()));
}

#[tokio::test]
async fn rotation_clears_recovery_slot() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, store) = vault_in(&dir);
    vault.store("a", "v").await.unwrap();
    vault.rotate().await.unwrap();
    assert_eq!(store.recovery_key().await.unwrap(), None);
}

#[tokio::test]
async fn old_ciphertext_resolves_via_recovery_key_mid_rotation() {
    // Simulate the window between rotation steps 3 and 4: the keyfile has
    // been swapped but the stored ciphertext is still under the old key,
    // which sits in the recovery slot.
    let dir = tempfile::tempdir().unwrap();
    let (vault, store) = vault_in(&dir);
    vault.store("s", "survivor").await.unwrap();

    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    let old_key = keyfile.derive().unwrap();
    store.put_recovery_key(&hex::encode(old_key), 300).await.unwrap();
    keyfile.replace(&Keyfile::fresh_password()).unwrap();

    assert_eq!(vault.resolve("s").await.unwrap(), Some("survivor".to_string()));
}

#[tokio::test]
async fn resolve_across_rotate_never_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("k", "v").await.unwrap();

    for _ in 0..3 {
        vault.rotate().await.unwrap();
        // Every post-rotation read returns the plaintext, never an error.
        assert_eq!(vault.resolve("k").await.unwrap(), Some("v".to_string()));
    }
}

#[tokio::test]
async fn bulk_cache_is_invalidated_by_store() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("a", "1").await.unwrap();
    let first = vault.resolve_all().await.unwrap();
    assert_eq!(first.len(), 1);

    vault.store("b", "2").await.unwrap();
    let second = vault.resolve_all().await.unwrap();
    assert_eq!(second.len(), 2);
}
