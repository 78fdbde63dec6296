//! PKCE (Proof Key for Code Exchange) verification.
//!
//! Implements S256 per RFC 7636. The provider only stores the challenge; the token endpoint
//! checks the verifier here before a code is exchanged.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::server::auth::constant_time_eq;

/// `BASE64URL(SHA256(code_verifier))`.
#[must_use]
pub fn challenge_s256(code_verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()))
}

/// RFC 7636 §4.1: 43 to 128 characters from the unreserved set.
#[must_use]
pub fn is_valid_verifier(code_verifier: &str) -> bool {
    (43..=128).contains(&code_verifier.len())
        && code_verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Verify a verifier against a stored S256 challenge.
#[must_use]
pub fn verify_s256(code_verifier: &str, code_challenge: &str) -> bool {
    is_valid_verifier(code_verifier)
        && constant_time_eq(code_challenge, &challenge_s256(code_verifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B test vector
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256_valid() {
        assert_eq!(challenge_s256(VERIFIER), CHALLENGE);
        assert!(verify_s256(VERIFIER, CHALLENGE));
    }

    #[test]
    fn test_s256_wrong_verifier() {
        let other = "x".repeat(43);
        assert!(!verify_s256(&other, CHALLENGE));
    }

    #[test]
    fn test_s256_wrong_challenge() {
        assert!(!verify_s256(VERIFIER, "wrong-challenge"));
    }

    #[test]
    fn test_verifier_format() {
        assert!(is_valid_verifier(VERIFIER));
        assert!(!is_valid_verifier("too-short"));
        assert!(!is_valid_verifier(&"a".repeat(129)));
        assert!(!is_valid_verifier(&format!("{}!", "a".repeat(43))));
    }
}
