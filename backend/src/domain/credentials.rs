//! Password credential store.
//!
//! Digests are `hex(SHA-512(password || salt))` with a random 128-bit salt
//! rendered as 32 lowercase hex characters. This single fast pass exists only
//! to stay compatible with stored accounts; it is not a password KDF and
//! should be replaced by a memory-hard hash before any real deployment.

use rand::Rng;
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

/// Salt and digest pair written onto an account together.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest {
    /// Hex-encoded 128-bit salt.
    pub salt: String,
    /// Hex-encoded SHA-512 digest of the password followed by the salt.
    pub hash: String,
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordDigest").finish_non_exhaustive()
    }
}

/// Derive a fresh salt and digest for `plaintext`.
///
/// # Examples
/// ```
/// use calendio::domain::credentials::{check_password, set_password};
///
/// let digest = set_password("secret");
/// assert_eq!(digest.salt.len(), 32);
/// assert!(check_password("secret", &digest.hash, &digest.salt));
/// ```
pub fn set_password(plaintext: &str) -> PasswordDigest {
    let salt = format!("{:032x}", rand::thread_rng().r#gen::<u128>());
    let hash = digest(plaintext, &salt);
    PasswordDigest { salt, hash }
}

/// Recompute the digest with `salt` and compare it against `hash`.
pub fn check_password(plaintext: &str, hash: &str, salt: &str) -> bool {
    constant_time_eq(digest(plaintext, salt).as_bytes(), hash.as_bytes())
}

fn digest(plaintext: &str, salt: &str) -> String {
    let mut material = Zeroizing::new(String::with_capacity(plaintext.len() + salt.len()));
    material.push_str(plaintext);
    material.push_str(salt);
    hex::encode(Sha512::digest(material.as_bytes()))
}

pub(crate) fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0_u8, |acc, (l, r)| acc | (l ^ r))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("secret")]
    #[case("")]
    #[case("pässwörd with spaces")]
    fn set_then_check_round_trips(#[case] password: &str) {
        let digest = set_password(password);
        assert!(check_password(password, &digest.hash, &digest.salt));
    }

    #[rstest]
    #[case("secret", "Secret")]
    #[case("secret", "secret ")]
    #[case("a", "b")]
    fn different_passwords_do_not_verify(#[case] stored: &str, #[case] attempt: &str) {
        let digest = set_password(stored);
        assert!(!check_password(attempt, &digest.hash, &digest.salt));
    }

    #[rstest]
    fn salts_are_hex_and_independent() {
        let first = set_password("secret");
        let second = set_password("secret");
        assert_eq!(first.salt.len(), 32);
        assert!(first.salt.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first.salt, second.salt);
        assert_ne!(first.hash, second.hash);
    }

    #[rstest]
    fn digest_matches_sha512_of_password_then_salt() {
        let expected = hex::encode(Sha512::digest(b"secretabc"));
        assert_eq!(digest("secret", "abc"), expected);
        assert_eq!(expected.len(), 128);
    }

    #[rstest]
    fn truncated_hash_does_not_verify() {
        let digest = set_password("secret");
        let truncated = digest.hash.get(..64).expect("hash is 128 chars");
        assert!(!check_password("secret", truncated, &digest.salt));
    }
}
