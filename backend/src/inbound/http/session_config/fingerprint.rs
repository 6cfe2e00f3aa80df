//! Session key fingerprinting.
//!
//! A truncated SHA-256 of the signing half of the key. Logged at startup so
//! operators can tell which key is active without exposing it.

use actix_web::cookie::Key;
use sha2::{Digest, Sha256};

const FINGERPRINT_BYTES: usize = 8;

/// First 8 bytes of `SHA-256(key.signing())` as lowercase hex.
///
/// # Examples
///
/// ```rust
/// use actix_web::cookie::Key;
/// use calendio::inbound::http::session_config::fingerprint::key_fingerprint;
///
/// let fp = key_fingerprint(&Key::generate());
/// assert_eq!(fp.len(), 16);
/// ```
#[must_use]
pub fn key_fingerprint(key: &Key) -> String {
    let digest = Sha256::digest(key.signing());
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn fingerprint_is_stable_for_a_key() {
        let key = Key::derive_from(&[b'a'; 64]);
        assert_eq!(key_fingerprint(&key), key_fingerprint(&key));
    }

    #[rstest]
    fn fingerprint_is_short_lowercase_hex() {
        let fp = key_fingerprint(&Key::generate());
        assert_eq!(fp.len(), FINGERPRINT_BYTES * 2);
        assert!(fp.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[rstest]
    fn distinct_keys_have_distinct_fingerprints() {
        let first = key_fingerprint(&Key::derive_from(&[b'a'; 64]));
        let second = key_fingerprint(&Key::derive_from(&[b'b'; 64]));
        assert_ne!(first, second);
    }
}
