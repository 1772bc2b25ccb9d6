//! Access key generation and hashing.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a fresh access key for `org_id`: the org id followed by a v4
/// UUID in simple (unhyphenated) hex.
pub fn generate_key(org_id: &str) -> String {
    format!("{org_id}{}", Uuid::new_v4().simple())
}

/// SHA-256 of `token` as lowercase hex.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The token as stored: hashed when `hash_keys` is on, verbatim otherwise.
pub fn storage_token(token: &str, hash_keys: bool) -> String {
    if hash_keys {
        hash_token(token)
    } else {
        token.to_string()
    }
}
