// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sc-vault: authenticated-encryption secret store with hot key rotation.
//!
//! Secrets are AES-256-GCM ciphertexts in the broker; the key is derived
//! by scrypt from a node-owned password file. Rotation publishes the old
//! key to a short-lived recovery slot before swapping the file, so
//! concurrent readers never hit an undecryptable window.

mod cipher;
mod error;
mod keyfile;
mod store;
mod vault;

pub use cipher::{decrypt, encrypt};
pub use error::VaultError;
pub use keyfile::Keyfile;
pub use store::{MemorySecretStore, RedisSecretStore, SecretStore};
pub use vault::Vault;
