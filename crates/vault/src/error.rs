// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vault error type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("password file unusable at {path}: {reason}")]
    Keyfile { path: PathBuf, reason: String },

    #[error("ciphertext is malformed")]
    Malformed,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("secret store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
