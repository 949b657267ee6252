//! PKCE (Proof Key for Code Exchange) implementation
//!
//! Implements RFC 7636 with the `S256` and `plain` methods. Whether `plain`
//! is accepted on authorization requests is a deployment setting
//! (`oauth.allow_plain_pkce`); once a challenge has been stored it is
//! always verified with the method it was stored with.
//!
//! # Example
//!
//! ```
//! use smart_launch_auth::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkceVerifier};
//!
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! let stored = PkceChallenge::new(challenge.as_str().to_string(), PkceChallengeMethod::S256).unwrap();
//! assert!(stored.verify(&verifier).is_ok());
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be unreserved characters ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Challenge format is invalid for its method.
    #[error("Invalid code_challenge format")]
    InvalidChallengeFormat,

    /// Unsupported or disabled challenge method.
    #[error("Unsupported code_challenge_method: {0}")]
    UnsupportedMethod(String),

    /// The verifier doesn't match the challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Get the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::InvalidChallengeFormat
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::VerificationFailed => "invalid_grant",
        }
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PkceChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`.
    #[default]
    S256,
    /// The challenge is the verifier itself.
    #[serde(rename = "plain")]
    Plain,
}

impl PkceChallengeMethod {
    /// Parse challenge method from the request parameter.
    ///
    /// A missing parameter means `plain` (RFC 7636 section 4.3).
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for any other value.
    pub fn parse(method: Option<&str>) -> Result<Self, PkceError> {
        match method {
            Some("S256") => Ok(Self::S256),
            Some("plain") | None => Ok(Self::Plain),
            Some(other) => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// 43-128 characters from `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

fn is_unreserved(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}

fn check_verifier_syntax(s: &str) -> Result<(), PkceError> {
    if !(43..=128).contains(&s.len()) {
        return Err(PkceError::InvalidVerifierLength(s.len()));
    }
    if !is_unreserved(s) {
        return Err(PkceError::InvalidVerifierCharacters);
    }
    Ok(())
}

impl PkceVerifier {
    /// Create a verifier from the `code_verifier` parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the length or character set is invalid.
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        check_verifier_syntax(&verifier)?;
        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier.
    ///
    /// 32 random bytes encoded as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// A stored PKCE code challenge and its method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    challenge: String,
    method: PkceChallengeMethod,
}

impl PkceChallenge {
    /// Create an S256 challenge from a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self {
            challenge: s256(verifier.as_str()),
            method: PkceChallengeMethod::S256,
        }
    }

    /// Create a challenge from the `code_challenge` parameter.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` if an S256 challenge is
    /// not the base64url encoding of 32 bytes, or a plain challenge is not
    /// a syntactically valid verifier.
    pub fn new(challenge: String, method: PkceChallengeMethod) -> Result<Self, PkceError> {
        let valid = match method {
            PkceChallengeMethod::S256 => URL_SAFE_NO_PAD
                .decode(&challenge)
                .is_ok_and(|bytes| bytes.len() == 32),
            PkceChallengeMethod::Plain => check_verifier_syntax(&challenge).is_ok(),
        };
        if !valid {
            return Err(PkceError::InvalidChallengeFormat);
        }
        Ok(Self { challenge, method })
    }

    /// Verify that a verifier matches this challenge.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        let computed = match self.method {
            PkceChallengeMethod::S256 => s256(verifier.as_str()),
            PkceChallengeMethod::Plain => verifier.as_str().to_string(),
        };
        if constant_time_eq(computed.as_bytes(), self.challenge.as_bytes()) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.challenge
    }

    /// Get the challenge method.
    #[must_use]
    pub fn method(&self) -> PkceChallengeMethod {
        self.method
    }
}

/// Returns `true` if `verifier` satisfies `challenge` under `method`.
///
/// Malformed input on any side yields `false`.
#[must_use]
pub fn verify_pkce(verifier: &str, challenge: &str, method: PkceChallengeMethod) -> bool {
    let Ok(verifier) = PkceVerifier::new(verifier.to_string()) else {
        return false;
    };
    PkceChallenge::new(challenge.to_string(), method)
        .and_then(|challenge| challenge.verify(&verifier))
        .is_ok()
}

fn s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc7636_test_vector() {
        let verifier = PkceVerifier::new(RFC_VERIFIER.to_string()).unwrap();
        assert_eq!(PkceChallenge::from_verifier(&verifier).as_str(), RFC_CHALLENGE);
        assert!(verify_pkce(RFC_VERIFIER, RFC_CHALLENGE, PkceChallengeMethod::S256));
    }

    #[test]
    fn test_s256_roundtrip_for_random_verifiers() {
        for _ in 0..64 {
            let verifier = PkceVerifier::generate();
            let challenge = s256(verifier.as_str());
            assert!(verify_pkce(
                verifier.as_str(),
                &challenge,
                PkceChallengeMethod::S256
            ));
        }
    }

    #[test]
    fn test_single_bit_mutation_fails() {
        for _ in 0..16 {
            let verifier = PkceVerifier::generate();
            let challenge = s256(verifier.as_str());
            let bytes = verifier.as_str().as_bytes();

            for i in 0..bytes.len() {
                for bit in 0..7 {
                    let mut mutated = bytes.to_vec();
                    mutated[i] ^= 1 << bit;
                    let Ok(mutated) = String::from_utf8(mutated) else {
                        continue;
                    };
                    assert!(
                        !verify_pkce(&mutated, &challenge, PkceChallengeMethod::S256),
                        "mutation at byte {i} bit {bit} verified"
                    );
                }
            }
        }
    }

    #[test]
    fn test_plain_method_is_exact_equality() {
        let verifier = PkceVerifier::generate();
        assert!(verify_pkce(
            verifier.as_str(),
            verifier.as_str(),
            PkceChallengeMethod::Plain
        ));

        let other = PkceVerifier::generate();
        assert!(!verify_pkce(
            other.as_str(),
            verifier.as_str(),
            PkceChallengeMethod::Plain
        ));
    }

    #[test]
    fn test_s256_challenge_not_accepted_as_plain_verifier() {
        assert!(!verify_pkce(
            RFC_CHALLENGE,
            RFC_CHALLENGE,
            PkceChallengeMethod::S256
        ));
    }

    #[test]
    fn test_verifier_length_bounds() {
        assert!(matches!(
            PkceVerifier::new("a".repeat(42)),
            Err(PkceError::InvalidVerifierLength(42))
        ));
        assert!(PkceVerifier::new("a".repeat(43)).is_ok());
        assert!(PkceVerifier::new("a".repeat(128)).is_ok());
        assert!(matches!(
            PkceVerifier::new("a".repeat(129)),
            Err(PkceError::InvalidVerifierLength(129))
        ));
    }

    #[test]
    fn test_verifier_characters() {
        let mut verifier = "a".repeat(42);
        verifier.push('+');
        assert!(matches!(
            PkceVerifier::new(verifier),
            Err(PkceError::InvalidVerifierCharacters)
        ));
    }

    #[test]
    fn test_challenge_format() {
        assert!(PkceChallenge::new(RFC_CHALLENGE.to_string(), PkceChallengeMethod::S256).is_ok());
        assert!(matches!(
            PkceChallenge::new("short".to_string(), PkceChallengeMethod::S256),
            Err(PkceError::InvalidChallengeFormat)
        ));
        assert!(matches!(
            PkceChallenge::new("short".to_string(), PkceChallengeMethod::Plain),
            Err(PkceError::InvalidChallengeFormat)
        ));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(
            PkceChallengeMethod::parse(Some("S256")).unwrap(),
            PkceChallengeMethod::S256
        );
        assert_eq!(
            PkceChallengeMethod::parse(Some("plain")).unwrap(),
            PkceChallengeMethod::Plain
        );
        assert_eq!(
            PkceChallengeMethod::parse(None).unwrap(),
            PkceChallengeMethod::Plain
        );
        assert!(matches!(
            PkceChallengeMethod::parse(Some("S512")),
            Err(PkceError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PkceError::VerificationFailed.oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            PkceError::InvalidChallengeFormat.oauth_error_code(),
            "invalid_request"
        );
    }
}
