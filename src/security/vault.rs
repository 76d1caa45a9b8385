//! Secret generation and comparison.
//!
//! All action tokens, CSRF tokens and session ids come from here. Bytes are
//! drawn from the operating system CSPRNG only; there is no fallback source.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Minimum number of random bytes behind a token.
pub const MIN_TOKEN_BYTES: usize = 32;

/// Token vault failures.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("token length {0} is below the {MIN_TOKEN_BYTES}-byte minimum")]
    TooShort(usize),
}

/// Generate a URL-safe token from `byte_len` random bytes.
pub fn generate(byte_len: usize) -> Result<String, VaultError> {
    if byte_len < MIN_TOKEN_BYTES {
        return Err(VaultError::TooShort(byte_len));
    }
    let mut bytes = vec![0u8; byte_len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| VaultError::EntropyUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a token with the minimum length.
pub fn generate_default() -> Result<String, VaultError> {
    generate(MIN_TOKEN_BYTES)
}

/// Constant-time equality. Length differences return early, which only
/// leaks the length.
pub fn compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Storage key for a token. Stores never hold the token itself.
pub fn digest(token: &str) -> String {
    STANDARD.encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check applied before any store lookup.
pub fn is_well_formed(token: &str) -> bool {
    let min_chars = (MIN_TOKEN_BYTES * 4).div_ceil(3);
    token.len() >= min_chars
        && token.len() <= 512
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generated_tokens_are_url_safe_and_unique() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_default().unwrap()).collect();
        assert_eq!(tokens.len(), 64);
        for token in &tokens {
            assert_eq!(token.len(), 43);
            assert!(is_well_formed(token));
            assert_eq!(URL_SAFE_NO_PAD.decode(token).unwrap().len(), 32);
        }
    }

    #[test]
    fn short_lengths_are_refused() {
        assert!(matches!(generate(16), Err(VaultError::TooShort(16))));
        assert_eq!(generate(48).unwrap().len(), 64);
    }

    #[test]
    fn compare_is_exact() {
        assert!(compare("secret-value", "secret-value"));
        assert!(!compare("secret-value", "secret-valuE"));
        assert!(!compare("secret", "secret-value"));
        assert!(!compare("", "x"));
    }

    #[test]
    fn digest_is_stable_and_distinct() {
        assert_eq!(digest("a"), digest("a"));
        assert_ne!(digest("a"), digest("b"));
        assert_ne!(digest("a"), "a");
    }

    #[test]
    fn shape_check_rejects_junk() {
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed(&"a/".repeat(30)));
        assert!(!is_well_formed(&"a".repeat(600)));
    }
}
