// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AES-256-GCM encryption with the `iv:tag:ciphertext` hex wire form.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};

use crate::error::VaultError;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt a plaintext under a 32-byte key. Wire form is three
/// colon-delimited lowercase hex fields: IV, auth tag, ciphertext body.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> Result<String, VaultError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::DecryptFailed)?;

    // aes-gcm appends the 16-byte tag to the ciphertext; the wire form
    // carries it as its own field.
    let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
    Ok(format!("{}:{}:{}", hex::encode(nonce), hex::encode(tag), hex::encode(body)))
}

/// Decrypt the `iv:tag:ciphertext` wire form under a 32-byte key.
pub fn decrypt(key: &[u8; 32], wire: &str) -> Result<String, VaultError> {
    let mut parts = wire.splitn(3, ':');
    let iv = hex::decode(parts.next().ok_or(VaultError::Malformed)?)
        .map_err(|_| VaultError::Malformed)?;
    let tag = hex::decode(parts.next().ok_or(VaultError::Malformed)?)
        .map_err(|_| VaultError::Malformed)?;
    let body = hex::decode(parts.next().ok_or(VaultError::Malformed)?)
        .map_err(|_| VaultError::Malformed)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN {
        return Err(VaultError::Malformed);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut sealed = body;
    sealed.extend_from_slice(&tag);
    let plain = cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
        .map_err(|_| VaultError::DecryptFailed)?;
    String::from_utf8(plain).map_err(|_| VaultError::DecryptFailed)
}

#[cfg(test)]
#[path = "cipher_tests.rs"]
mod tests;
