use sha2::{Digest, Sha256};

/// One-way digest over the plaintext: SHA-256, lowercase hex, always 64
/// chars. The rest of the system only ever compares digests.
pub fn hash_password(plain: &str) -> String {
    let digest = Sha256::digest(plain.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    hash_password(plain) == stored_hash
}
