// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Constant-time bearer-token comparison.

use subtle::ConstantTimeEq;

/// Length both tokens are padded to before comparison, so timing reveals
/// neither the mismatch position nor the configured token's length.
const PAD_LEN: usize = 256;

/// Compare a presented token against the expected one in constant time.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let mut a = [0u8; PAD_LEN];
    let mut b = [0u8; PAD_LEN];
    let pb = presented.as_bytes();
    let eb = expected.as_bytes();
    // Oversized tokens can't match any padded expected value.
    if pb.len() > PAD_LEN || eb.len() > PAD_LEN {
        return pb.ct_eq(eb).into();
    }
    a[..pb.len()].copy_from_slice(pb);
    b[..eb.len()].copy_from_slice(eb);
    let lengths_equal = (pb.len() as u64).ct_eq(&(eb.len() as u64));
    let bytes_equal = a.ct_eq(&b);
    (lengths_equal & bytes_equal).into()
}

/// Extract the token from an `Authorization: Bearer …` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
