//! OAuth 2.0 client registration types.
//!
//! Clients are owned by an external registry. This crate only reads them
//! through [`crate::storage::ClientRegistry`].

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};

use crate::smart::scopes::ScopeSet;

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types handled by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Refresh Token flow.
    RefreshToken,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a `grant_type` parameter value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier used in OAuth flows.
    pub client_id: String,

    /// Human-readable display name.
    #[serde(default)]
    pub name: String,

    /// Argon2 PHC hash of the client secret (confidential clients only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_hash: Option<String>,

    /// Grant types this client may use.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,

    /// Registered redirect URIs, compared by exact string equality.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Scopes this client may be granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Whether this is a confidential client.
    #[serde(default)]
    pub confidential: bool,

    /// Whether this client may currently be used.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

fn default_active() -> bool {
    true
}

/// Client registration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientValidationError {
    /// Client ID is empty.
    #[error("client_id cannot be empty")]
    EmptyClientId,

    /// No grant types configured.
    #[error("at least one grant type is required")]
    NoGrantTypes,

    /// Confidential client without a secret hash.
    #[error("confidential clients must have a client secret")]
    MissingSecret,

    /// Authorization code client without redirect URIs.
    #[error("authorization_code clients must register at least one redirect URI")]
    NoRedirectUris,

    /// A redirect URI is not an absolute URL or carries a fragment.
    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
}

impl Client {
    /// Validates the registration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ClientValidationError> {
        if self.client_id.is_empty() {
            return Err(ClientValidationError::EmptyClientId);
        }

        if self.grant_types.is_empty() {
            return Err(ClientValidationError::NoGrantTypes);
        }

        if self.confidential && self.client_secret_hash.is_none() {
            return Err(ClientValidationError::MissingSecret);
        }

        if self.grant_types.contains(&GrantType::AuthorizationCode) && self.redirect_uris.is_empty()
        {
            return Err(ClientValidationError::NoRedirectUris);
        }

        for uri in &self.redirect_uris {
            match url::Url::parse(uri) {
                Ok(parsed) if parsed.fragment().is_none() => {}
                _ => return Err(ClientValidationError::InvalidRedirectUri(uri.clone())),
            }
        }

        Ok(())
    }

    /// Returns `true` if `uri` exactly equals a registered redirect URI.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Returns `true` if the client may use `grant_type`.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Returns the scopes this client may be granted.
    ///
    /// Malformed registered scopes are skipped.
    #[must_use]
    pub fn allowed_scopes(&self) -> ScopeSet {
        ScopeSet::parse_lenient(&self.scopes.join(" "))
    }

    /// Verifies a presented client secret against the stored hash.
    ///
    /// Returns `false` for public clients and for unparseable hashes.
    #[must_use]
    pub fn verify_secret(&self, secret: &str) -> bool {
        let Some(hash) = self.client_secret_hash.as_deref() else {
            return false;
        };
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "Stored client secret hash is malformed");
                false
            }
        }
    }
}

/// Hashes a client secret for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails.
pub fn hash_client_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}
