// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vault round-trip and rotation survivability, end to end over the
//! in-memory secret store.

use sc_vault::{Keyfile, MemorySecretStore, SecretStore, Vault};
use std::sync::Arc;

fn vault_in(dir: &tempfile::TempDir) -> (Vault, Arc<MemorySecretStore>) {
    let store = Arc::new(MemorySecretStore::new());
    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    keyfile.ensure().unwrap();
    (Vault::new(store.clone(), keyfile), store)
}

#[tokio::test]
async fn store_resolve_round_trip_for_arbitrary_values() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    for value in ["plain", "with spaces and ünïcode", "", "{\"json\":true}"] {
        vault.store("k", value).await.unwrap();
        assert_eq!(vault.resolve("k").await.unwrap().as_deref(), Some(value));
    }
}

#[tokio::test]
async fn readers_interleaved_with_rotation_always_see_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, _) = vault_in(&dir);
    vault.store("api-key", "sk-original").await.unwrap();

    for round in 0..5 {
        vault.rotate().await.unwrap();
        let resolved = vault.resolve("api-key").await.unwrap();
        assert_eq!(
            resolved.as_deref(),
            Some("sk-original"),
            "round {round}: rotation must never lose a secret"
        );
        let all = vault.resolve_all().await.unwrap();
        assert_eq!(all.get("api-key").map(String::as_str), Some("sk-original"));
    }
}

#[tokio::test]
async fn mid_rotation_window_reads_fall_back_to_recovery_key() {
    // Freeze the world between rotation steps 3 and 4: keyfile swapped,
    // ciphertexts still old, old derived key in the recovery slot.
    let dir = tempfile::tempdir().unwrap();
    let (vault, store) = vault_in(&dir);
    vault.store("s", "survives").await.unwrap();

    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    let old_key = keyfile.derive().unwrap();
    store
        .put_recovery_key(&hex_encode(&old_key), 300)
        .await
        .unwrap();
    keyfile.replace(&Keyfile::fresh_password()).unwrap();

    assert_eq!(vault.resolve("s").await.unwrap().as_deref(), Some("survives"));
    let all = vault.resolve_all().await.unwrap();
    assert_eq!(all.get("s").map(String::as_str), Some("survives"));
}

#[tokio::test]
async fn ciphertext_wire_form_is_colon_delimited_hex() {
    let dir = tempfile::tempdir().unwrap();
    let (vault, store) = vault_in(&dir);
    vault.store("n", "v").await.unwrap();
    let wire = store.get("n").await.unwrap().unwrap();
    let parts: Vec<&str> = wire.split(':').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 24, "12-byte IV as hex");
    assert_eq!(parts[1].len(), 32, "16-byte tag as hex");
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
