//! JWT access token encoding and validation.
//!
//! Access tokens are self-contained JWTs. A resource server verifies them
//! with the public key published at the JWKS endpoint (or the shared secret
//! for HS256) and never has to call back into the authorization server.
//!
//! ## Supported Algorithms
//!
//! - **HS256**: HMAC with SHA-256 (shared secret, single trust domain)
//! - **RS256**: RSA with SHA-256 (widely compatible)
//! - **RS384**: RSA with SHA-384 (SMART on FHIR preferred)
//! - **ES384**: ECDSA with P-384 curve (SMART on FHIR preferred, smaller keys)
//!
//! ## Example
//!
//! ```ignore
//! use smart_launch_auth::token::jwt::{JwtService, SigningKeyPair, SigningAlgorithm};
//!
//! let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS384)?;
//! let jwt = JwtService::new(key_pair, "https://auth.example.com")
//!     .with_audience(vec!["https://fhir.example.com".to_string()]);
//!
//! let token = jwt.encode(&claims)?;
//! let claims = jwt.decode(&token)?;
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::{DecodePrivateKey as EcDecodePrivateKey, EncodePrivateKey as EcEncodePrivateKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::AuthConfig;
use crate::smart::scopes::ScopeSet;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation error (expired, invalid signature, etc.).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::decoding_error(err.to_string()),
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for JWT tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 over a shared secret.
    HS256,
    /// RSA with SHA-256 (widely compatible).
    RS256,
    /// RSA with SHA-384 (SMART on FHIR preferred).
    RS384,
    /// ECDSA with P-384 curve (SMART on FHIR preferred, smaller keys).
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }

    /// Returns `true` if this is a shared-secret algorithm.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::HS256)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Access token claims.
///
/// `patient`, `encounter` and `fhirUser` are only present when the grant
/// carried that context and the matching scope was granted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer (authorization server URL).
    pub iss: String,

    /// Subject (resource owner ID).
    pub sub: String,

    /// Audience (FHIR server URLs).
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// JWT ID (unique identifier for revocation).
    pub jti: String,

    /// Space-separated scopes.
    pub scope: String,

    /// OAuth client ID.
    pub client_id: String,

    /// Patient context (FHIR Patient resource ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Encounter context (FHIR Encounter resource ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,

    /// User's FHIR resource reference (e.g., "Practitioner/123").
    #[serde(
        rename = "fhirUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fhir_user: Option<String>,
}

impl AccessTokenClaims {
    /// Creates a new builder for access token claims.
    #[must_use]
    pub fn builder(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        client_id: impl Into<String>,
    ) -> AccessTokenClaimsBuilder {
        AccessTokenClaimsBuilder::new(issuer, subject, client_id)
    }

    /// Parses the granted scopes. Malformed entries are skipped.
    #[must_use]
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse_lenient(&self.scope)
    }

    /// Seconds until expiry, or zero if already expired.
    #[must_use]
    pub fn remaining_lifetime(&self, now: OffsetDateTime) -> Duration {
        let remaining = self.exp - now.unix_timestamp();
        Duration::from_secs(u64::try_from(remaining).unwrap_or(0))
    }
}

/// Builder for `AccessTokenClaims`.
pub struct AccessTokenClaimsBuilder {
    iss: String,
    sub: String,
    aud: Vec<String>,
    exp: i64,
    iat: i64,
    jti: String,
    scope: String,
    client_id: String,
    patient: Option<String>,
    encounter: Option<String>,
    fhir_user: Option<String>,
}

impl AccessTokenClaimsBuilder {
    fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: Vec::new(),
            exp: now + 3600,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            scope: String::new(),
            client_id: client_id.into(),
            patient: None,
            encounter: None,
            fhir_user: None,
        }
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience(mut self, aud: Vec<String>) -> Self {
        self.aud = aud;
        self
    }

    /// Sets the issue time. Expiry keeps its offset from the issue time.
    #[must_use]
    pub fn issued_at(mut self, iat: OffsetDateTime) -> Self {
        let lifetime = self.exp - self.iat;
        self.iat = iat.unix_timestamp();
        self.exp = self.iat + lifetime;
        self
    }

    /// Sets the expiration time in seconds from the issue time.
    #[must_use]
    pub fn expires_in_seconds(mut self, seconds: i64) -> Self {
        self.exp = self.iat + seconds;
        self
    }

    /// Sets the scopes.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Sets the patient context.
    #[must_use]
    pub fn patient(mut self, patient: Option<String>) -> Self {
        self.patient = patient;
        self
    }

    /// Sets the encounter context.
    #[must_use]
    pub fn encounter(mut self, encounter: Option<String>) -> Self {
        self.encounter = encounter;
        self
    }

    /// Sets the FHIR user reference.
    #[must_use]
    pub fn fhir_user(mut self, fhir_user: Option<String>) -> Self {
        self.fhir_user = fhir_user;
        self
    }

    /// Builds the access token claims.
    #[must_use]
    pub fn build(self) -> AccessTokenClaims {
        AccessTokenClaims {
            iss: self.iss,
            sub: self.sub,
            aud: self.aud,
            exp: self.exp,
            iat: self.iat,
            jti: self.jti,
            scope: self.scope,
            client_id: self.client_id,
            patient: self.patient,
            encounter: self.encounter,
            fhir_user: self.fhir_user,
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// An asymmetric signing key pair.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,
}

enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl SigningKeyPair {
    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pem(
            uuid::Uuid::new_v4().to_string(),
            algorithm,
            &private_pem,
            &public_pem,
        )
    }

    /// Generates a new EC key pair using the P-384 curve.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;

        Self::from_pem(
            uuid::Uuid::new_v4().to_string(),
            SigningAlgorithm::ES384,
            &private_pem,
            "",
        )
    }

    /// Generates a key pair for an asymmetric algorithm.
    ///
    /// # Errors
    /// Returns an error for `HS256` or if key generation fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        match algorithm {
            SigningAlgorithm::RS256 | SigningAlgorithm::RS384 => Self::generate_rsa(algorithm),
            SigningAlgorithm::ES384 => Self::generate_ec(),
            SigningAlgorithm::HS256 => Err(JwtError::invalid_key(
                "HS256 uses a shared secret, not a key pair",
            )),
        }
    }

    /// Loads a key pair from PEM strings.
    ///
    /// RSA keys need both halves. For ES384 the public key is derived from
    /// the private key (PKCS#8 or SEC1) and `public_pem` is ignored.
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, JwtError> {
        let (encoding_key, decoding_key, public_key_data) = match algorithm {
            SigningAlgorithm::RS256 | SigningAlgorithm::RS384 => {
                let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;

                let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let n = public_key.n().to_bytes_be();
                let e = public_key.e().to_bytes_be();

                (encoding_key, decoding_key, PublicKeyData::Rsa { n, e })
            }
            SigningAlgorithm::ES384 => {
                let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                    .or_else(|_| EcSecretKey::from_sec1_pem(private_pem))
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;

                // jsonwebtoken only reads PKCS#8 EC keys
                let pkcs8 = secret_key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;
                let encoding_key = EncodingKey::from_ec_pem(pkcs8.as_bytes())
                    .map_err(|e| JwtError::invalid_key(e.to_string()))?;

                let point = EcSigningKey::from(&secret_key)
                    .verifying_key()
                    .to_encoded_point(false);
                let x = point
                    .x()
                    .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
                let y = point
                    .y()
                    .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

                let decoding_key = DecodingKey::from_ec_components(
                    &URL_SAFE_NO_PAD.encode(x.as_slice()),
                    &URL_SAFE_NO_PAD.encode(y.as_slice()),
                )
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;

                (
                    encoding_key,
                    decoding_key,
                    PublicKeyData::Ec {
                        x: x.to_vec(),
                        y: y.to_vec(),
                    },
                )
            }
            SigningAlgorithm::HS256 => {
                return Err(JwtError::invalid_key(
                    "HS256 uses a shared secret, not a key pair",
                ));
            }
        };

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data,
        })
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Encodes and validates access tokens with a single key.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks.
pub struct JwtService {
    algorithm: SigningAlgorithm,
    kid: Option<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwk: Option<Jwk>,
    issuer: String,
    audience: Vec<String>,
    leeway: Duration,
}

impl JwtService {
    /// Creates a service signing with an asymmetric key pair.
    #[must_use]
    pub fn new(signing_key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        let jwk = signing_key.to_jwk();
        Self {
            algorithm: signing_key.algorithm,
            kid: Some(signing_key.kid),
            encoding_key: signing_key.encoding_key,
            decoding_key: signing_key.decoding_key,
            jwk: Some(jwk),
            issuer: issuer.into(),
            audience: Vec::new(),
            leeway: Duration::ZERO,
        }
    }

    /// Creates a service signing with an HS256 shared secret.
    #[must_use]
    pub fn hmac(secret: &[u8], kid: Option<String>, issuer: impl Into<String>) -> Self {
        Self {
            algorithm: SigningAlgorithm::HS256,
            kid,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            jwk: None,
            issuer: issuer.into(),
            audience: Vec::new(),
            leeway: Duration::ZERO,
        }
    }

    /// Builds the service described by `config`.
    ///
    /// Asymmetric algorithms without configured key files get an ephemeral
    /// key pair.
    ///
    /// # Errors
    /// Returns an error if the secret is missing or a key cannot be loaded.
    pub fn from_config(config: &AuthConfig) -> Result<Self, JwtError> {
        let signing = &config.signing;

        let service = match (
            signing.algorithm,
            &signing.private_key_path,
            &signing.public_key_path,
        ) {
            (SigningAlgorithm::HS256, _, _) => {
                let secret = signing
                    .secret
                    .as_deref()
                    .ok_or_else(|| JwtError::invalid_key("signing.secret is required for HS256"))?;
                Self::hmac(secret.as_bytes(), signing.kid.clone(), &config.issuer)
            }
            (algorithm, Some(private_path), Some(public_path)) => {
                let private_pem = read_pem(private_path)?;
                let public_pem = read_pem(public_path)?;
                let kid = signing
                    .kid
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                tracing::info!(kid = %kid, algorithm = %algorithm, "Loaded signing key");
                Self::new(
                    SigningKeyPair::from_pem(kid, algorithm, &private_pem, &public_pem)?,
                    &config.issuer,
                )
            }
            (algorithm, _, _) => {
                let mut key_pair = SigningKeyPair::generate(algorithm)?;
                if let Some(kid) = &signing.kid {
                    key_pair.kid = kid.clone();
                }
                tracing::warn!(
                    kid = %key_pair.kid,
                    algorithm = %algorithm,
                    "No signing key configured, generated an ephemeral key pair"
                );
                Self::new(key_pair, &config.issuer)
            }
        };

        Ok(service
            .with_audience(config.audience.clone())
            .with_leeway(config.oauth.clock_skew))
    }

    /// Sets the accepted audiences. Empty disables the audience check.
    #[must_use]
    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }

    /// Sets the clock skew tolerated on `exp` and `iat`.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode(&self, claims: &AccessTokenClaims) -> Result<String, JwtError> {
        let mut header = Header::new(self.algorithm.to_jwt_algorithm());
        header.kid.clone_from(&self.kid);

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// Checks the signature, issuer, audience and that `exp` is strictly in
    /// the future. The configured leeway applies to `iat` only.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(self.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.leeway = 0;
        if self.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audience);
        }

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)?.claims;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if claims.exp <= now {
            return Err(JwtError::Expired);
        }

        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        let latest_iat = now.saturating_add(leeway);
        if claims.iat > latest_iat {
            return Err(JwtError::invalid_claims("iat is in the future"));
        }

        Ok(claims)
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Returns the issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the JWKS containing the public key. Empty for HS256.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: self.jwk.iter().cloned().collect(),
        }
    }
}

fn read_pem(path: &Path) -> Result<String, JwtError> {
    std::fs::read_to_string(path)
        .map_err(|e| JwtError::invalid_key(format!("cannot read {}: {e}", path.display())))
}

// ============================================================================
// Tests
// ============================================================================
