// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

const KEY: [u8; 32] = [7u8; 32];

#[test]
fn round_trip() {
    let wire = encrypt(&KEY, "hunter2").unwrap();
    assert_eq!(decrypt(&KEY, &wire).unwrap(), "hunter2");
}

#[test]
fn wire_form_has_three_hex_fields() {
    let wire = encrypt(&KEY, "x").unwrap();
    let parts: Vec<&str> = wire.split(':').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 24); // 12-byte IV
    assert_eq!(parts[1].len(), 32); // 16-byte tag
    assert!(parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit())));
}

#[test]
fn wrong_key_fails_clean() {
    let wire = encrypt(&KEY, "secret").unwrap();
    let other = [8u8; 32];
    assert!(matches!(decrypt(&other, &wire), Err(VaultError::DecryptFailed)));
}

#[test]
fn tampered_tag_fails() {
    let wire = encrypt(&KEY, "secret").unwrap();
    let mut parts: Vec<String> = wire.split(':').map(String::from).collect();
    let flipped = if parts[1].starts_with('0') { "f" } else { "0" };
    parts[1].replace_range(0..1, flipped);
    assert!(decrypt(&KEY, &parts.join(":")).is_err());
}

#[test]
fn malformed_inputs_rejected() {
    assert!(matches!(decrypt(&KEY, "not hex"), Err(VaultError::Malformed)));
    assert!(matches!(decrypt(&KEY, "aa:bb"), Err(VaultError::Malformed)));
    assert!(matches!(decrypt(&KEY, "aa:bb:cc"), Err(VaultError::Malformed)));
}

#[test]
fn iv_is_fresh_per_encryption() {
    let a = encrypt(&KEY, "same").unwrap();
    let b = encrypt(&KEY, "same").unwrap();
    assert_ne!(a, b);
}

proptest! {
    #[test]
    fn round_trip_any_plaintext(plaintext in ".*") {
        let wire = encrypt(&KEY, &plaintext).unwrap();
        prop_assert_eq!(decrypt(&KEY, &wire).unwrap(), plaintext);
    }
}
