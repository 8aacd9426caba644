//! Content checksums for stored releases.

use sha2::{Digest, Sha256};

/// Computes the hex SHA-256 of `content`.
#[must_use]
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Returns true if `content` hashes to `expected`.
#[must_use]
pub fn verify(content: &[u8], expected: &str) -> bool {
    checksum(content).eq_ignore_ascii_case(expected)
}
