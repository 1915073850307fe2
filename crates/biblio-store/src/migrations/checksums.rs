//! Checksums of migration SQL, recorded on apply and re-checked later

use sha2::{Digest, Sha256};

/// Hex-encoded SHA256 of `content`
pub fn compute_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
