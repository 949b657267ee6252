//! Signing seams used by the token service.
//!
//! [`JwtService`] implements both traits. Tests and deployments with an
//! external key service can supply their own.

use super::jwt::{AccessTokenClaims, Jwks, JwtError, JwtService, SigningAlgorithm};

/// Produces signed access tokens.
pub trait Signer: Send + Sync {
    /// Signs `claims` into a compact JWT.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    fn sign(&self, claims: &AccessTokenClaims) -> Result<String, JwtError>;

    /// The algorithm placed in the token header.
    fn algorithm(&self) -> SigningAlgorithm;
}

/// Validates access tokens produced by a matching [`Signer`].
pub trait Verifier: Send + Sync {
    /// Checks signature, issuer, audience and time claims.
    ///
    /// Revocation is not checked here.
    ///
    /// # Errors
    /// Returns an error if any check fails.
    fn verify(&self, token: &str) -> Result<AccessTokenClaims, JwtError>;

    /// Public keys resource servers may use to verify tokens offline.
    fn jwks(&self) -> Jwks;
}

impl Signer for JwtService {
    fn sign(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        self.encode(claims)
    }

    fn algorithm(&self) -> SigningAlgorithm {
        JwtService::algorithm(self)
    }
}

impl Verifier for JwtService {
    fn verify(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        self.decode(token)
    }

    fn jwks(&self) -> Jwks {
        JwtService::jwks(self)
    }
}
