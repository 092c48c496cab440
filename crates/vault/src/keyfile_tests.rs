// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ensure_creates_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    keyfile.ensure().unwrap();
    let first = std::fs::read_to_string(keyfile.path()).unwrap();
    assert_eq!(first.len(), 96); // 48 random bytes, hex

    keyfile.ensure().unwrap();
    let second = std::fs::read_to_string(keyfile.path()).unwrap();
    assert_eq!(first, second);
}

#[cfg(unix)]
#[test]
fn file_mode_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    keyfile.ensure().unwrap();
    let mode = std::fs::metadata(keyfile.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn derive_is_deterministic_per_contents() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    keyfile.ensure().unwrap();
    let a = keyfile.derive().unwrap();
    let b = keyfile.derive().unwrap();
    assert_eq!(a, b);
}

#[test]
fn replace_changes_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = Keyfile::new(dir.path().join("scalyclaw.ps"));
    keyfile.ensure().unwrap();
    let before = keyfile.derive().unwrap();
    keyfile.replace(&Keyfile::fresh_password()).unwrap();
    let after = keyfile.derive().unwrap();
    assert_ne!(before, after);
}

#[test]
fn missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let keyfile = Keyfile::new(dir.path().join("nope.ps"));
    assert!(matches!(keyfile.derive(), Err(VaultError::Keyfile { .. })));
}

#[test]
fn derive_key_matches_known_shape() {
    let key = derive_key(b"fixed-password").unwrap();
    let again = derive_key(b"fixed-password").unwrap();
    assert_eq!(key, again);
    assert_ne!(key, derive_key(b"other-password").unwrap());
}
