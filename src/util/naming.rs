//! Item-name helpers: the content-hash sentinel and digest computation.

use sha2::{Digest, Sha256};

/// Sentinel item name requesting a name derived from the payload's SHA-256.
///
/// Submitting the same bytes twice under this sentinel resolves to the same
/// derived name, which the engine uses for idempotent re-submission.
pub const SHA256_SENTINEL: &str = "<sha256>";

/// Compute a lowercase SHA-256 hex digest of the given bytes.
pub fn sha256_name(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        assert_eq!(
            sha256_name(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_stable_and_hex() {
        let data = b"image bytes";
        assert_eq!(sha256_name(data), sha256_name(data));
        assert_eq!(sha256_name(data).len(), 64);
        assert!(sha256_name(data).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sentinel_is_not_a_valid_digest() {
        // The sentinel must never collide with a derived name.
        assert_ne!(SHA256_SENTINEL.len(), 64);
    }
}
