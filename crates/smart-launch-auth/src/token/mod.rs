//! Token issuance, validation and revocation.
//!
//! - [`jwt`]: access token claims, key material and JWT encoding
//! - [`signer`]: `Signer`/`Verifier` seams over the JWT service
//! - [`service`]: code exchange, refresh, verification and revocation

pub mod jwt;
pub mod service;
pub mod signer;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

pub use jwt::{
    AccessTokenClaims, AccessTokenClaimsBuilder, Jwk, Jwks, JwtError, JwtService,
    SigningAlgorithm, SigningKeyPair,
};
pub use service::{REVOKED_JTI_NAMESPACE, RevokedJti, TokenConfig, TokenService, TokenTypeHint};
pub use signer::{Signer, Verifier};

/// Generates an opaque bearer value.
///
/// 256 random bits encoded as base64url without padding (43 characters).
/// Used for authorization codes, launch tokens and refresh tokens.
#[must_use]
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hashes an opaque token for use as a store key.
///
/// Plaintext codes and tokens are never stored.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_token_shape() {
        let token = generate_opaque_token();
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_opaque_tokens_are_unique() {
        let mut tokens: Vec<String> = (0..100).map(|_| generate_opaque_token()).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn test_hash_token() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abd"), hash);
    }
}
