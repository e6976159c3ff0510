//! SHA-1 helpers for cache naming and playlist fingerprints.
//!
//! SHA-1 is a wire/disk contract here (cache file names are shared with
//! other fleet tooling), not a security boundary.

use sha1::{Digest, Sha1};

/// Hex-encoded SHA-1 of a UTF-8 string.
pub fn sha1_hex(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            sha1_hex("hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }
}
