use sha2::{Digest, Sha256};

use crate::core::store::CredentialKind;

/// One-way digest under which a credential is stored and looked up.
pub fn hash_credential(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `value` has the shape of a stored digest (64 lowercase hex chars).
pub fn is_credential_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Leading part of a key that is safe to log.
pub fn display_prefix(secret: &str, kind: CredentialKind) -> &str {
    let len = kind.display_prefix_len();
    match secret.char_indices().nth(len) {
        Some((idx, _)) => &secret[..idx],
        None => secret,
    }
}
