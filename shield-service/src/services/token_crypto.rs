//! Stateless hashing and comparison primitives for token material.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 hex digest. Stored in place of every raw token secret.
pub fn sha256_hex(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Length-constant comparison of two digests.
///
/// Differing byte lengths return false immediately; equal lengths compare
/// every byte regardless of where the first mismatch sits. Used even after
/// an equality-based database lookup so the comparison path itself carries
/// no timing signal.
pub fn constant_time_equals(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Opaque refresh token: 48 random bytes, URL-safe encoded. Only the
/// SHA-256 digest of the result is ever persisted.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
