//! Secret generation and hashing.
//!
//! API keys and unsubscribe tokens are random 128-bit values. Only a SHA-256
//! hash of an API key is stored, so a leaked database does not leak keys.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Prefix of every seller API key.
pub const API_KEY_PREFIX: &str = "rs_";

/// Number of characters of the key kept in clear for identification.
const VISIBLE_KEY_CHARS: usize = 11;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Generate a new seller API key ("rs_" + 32 hex chars).
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, random_hex(16))
}

/// The visible part of an API key that is safe to store and log.
pub fn api_key_prefix(api_key: &str) -> String {
    api_key.chars().take(VISIBLE_KEY_CHARS).collect()
}

/// Opaque URL-safe token (e.g. unsubscribe links).
pub fn generate_token() -> String {
    random_hex(16)
}

/// Short random suffix used to make slugs unique.
pub fn short_suffix() -> String {
    random_hex(3)
}

/// Hash a secret for storage. Domain-separated so hashes can't be reused elsewhere.
pub fn hash_secret(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"replaysell-v1:");
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
