//! Authorization server configuration.
//!
//! Token lifetimes, PKCE policy, launch token settings, SMART capabilities
//! and signing keys. Every section uses `#[serde(default)]` so a partial
//! TOML file only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::token::jwt::SigningAlgorithm;

/// Minimum length in bytes of an HS256 shared secret.
pub const MIN_HMAC_SECRET_LEN: usize = 32;

/// Root authorization server configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// issuer = "https://auth.example.com"
/// audience = ["https://fhir.example.com/r4"]
///
/// [auth.oauth]
/// access_token_lifetime = "1h"
/// refresh_token_rotation = false
///
/// [auth.signing]
/// algorithm = "ES384"
/// private_key_path = "/etc/smart-launch/signing.pem"
/// public_key_path = "/etc/smart-launch/signing.pub.pem"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL placed in the `iss` claim.
    pub issuer: String,

    /// Resource server identifiers accepted as `aud` and placed in tokens.
    pub audience: Vec<String>,

    /// OAuth 2.0 flow configuration.
    pub oauth: OAuthConfig,

    /// Launch token configuration.
    pub launch: LaunchConfig,

    /// SMART on FHIR capabilities.
    pub smart: SmartConfig,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Access token revocation tracking.
    pub revocation: RevocationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            audience: vec!["http://localhost:8080/fhir".to_string()],
            oauth: OAuthConfig::default(),
            launch: LaunchConfig::default(),
            smart: SmartConfig::default(),
            signing: SigningConfig::default(),
            revocation: RevocationConfig::default(),
        }
    }
}

/// OAuth 2.0 configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Absolute lifetime of an authorization code.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Absolute lifetime of an access token.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Absolute lifetime of a refresh token.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Rotate refresh tokens on use.
    /// When enabled, redeeming a refresh token invalidates it and issues a new one.
    /// When disabled, the same refresh token stays valid until it expires or is revoked.
    pub refresh_token_rotation: bool,

    /// Accept `code_challenge_method=plain`.
    pub allow_plain_pkce: bool,

    /// Require PKCE for clients without a secret.
    pub require_pkce_for_public_clients: bool,

    /// Require the `aud` parameter on authorization requests.
    pub require_aud: bool,

    /// Tolerance applied to `iat` and `exp` when verifying access tokens.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(300), // 5 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            refresh_token_lifetime: Duration::from_secs(60 * 24 * 3600), // 60 days
            refresh_token_rotation: true,
            allow_plain_pkce: true,
            require_pkce_for_public_clients: true,
            require_aud: true,
            clock_skew: Duration::from_secs(60),
        }
    }
}

/// Launch token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Lifetime of a launch token.
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Expose `POST /launch` so a co-located EHR can mint launch tokens.
    pub issuance_enabled: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(300),
            issuance_enabled: false,
        }
    }
}

/// SMART on FHIR configuration.
///
/// Flags map to the `capabilities` advertised in the discovery document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmartConfig {
    /// Enable EHR launch mode.
    pub launch_ehr_enabled: bool,

    /// Enable standalone launch mode.
    pub launch_standalone_enabled: bool,

    /// Allow public (PKCE-only) clients.
    pub public_clients_allowed: bool,

    /// Allow confidential clients with symmetric secrets.
    pub confidential_symmetric_allowed: bool,

    /// Issue refresh tokens for `offline_access`.
    pub refresh_tokens_enabled: bool,

    /// Advertise OpenID Connect scopes.
    pub openid_enabled: bool,

    /// Scopes advertised in the SMART configuration.
    pub supported_scopes: Vec<String>,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            launch_ehr_enabled: true,
            launch_standalone_enabled: true,
            public_clients_allowed: true,
            confidential_symmetric_allowed: true,
            refresh_tokens_enabled: true,
            openid_enabled: true,
            supported_scopes: vec![
                "openid".to_string(),
                "fhirUser".to_string(),
                "profile".to_string(),
                "launch".to_string(),
                "launch/patient".to_string(),
                "launch/encounter".to_string(),
                "offline_access".to_string(),
                "patient/*.read".to_string(),
                "patient/*.write".to_string(),
                "user/*.read".to_string(),
                "user/*.write".to_string(),
                "system/*.read".to_string(),
            ],
        }
    }
}

/// Token signing configuration.
///
/// With an asymmetric algorithm and no key paths, an ephemeral key pair is
/// generated at startup. Tokens then stop verifying after a restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Shared secret for HS256.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// PEM private key for RS256, RS384 or ES384.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,

    /// PEM public key matching `private_key_path`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<PathBuf>,

    /// Key ID placed in the JWT header and JWKS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: SigningAlgorithm::RS384,
            secret: None,
            private_key_path: None,
            public_key_path: None,
            kid: None,
        }
    }
}

/// Access token revocation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Record revoked `jti` values and check them on verification.
    pub track_jti: bool,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self { track_jti: true }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if url::Url::parse(&self.issuer).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an absolute URL, got '{}'",
                self.issuer
            )));
        }

        if self.audience.is_empty() {
            return Err(ConfigError::Missing("audience".to_string()));
        }

        for (name, lifetime) in [
            (
                "authorization_code_lifetime",
                self.oauth.authorization_code_lifetime,
            ),
            ("access_token_lifetime", self.oauth.access_token_lifetime),
            ("refresh_token_lifetime", self.oauth.refresh_token_lifetime),
            ("launch.token_lifetime", self.launch.token_lifetime),
        ] {
            if lifetime.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        match self.signing.algorithm {
            SigningAlgorithm::HS256 => {
                let secret = self
                    .signing
                    .secret
                    .as_deref()
                    .ok_or_else(|| ConfigError::Missing("signing.secret".to_string()))?;
                if secret.len() < MIN_HMAC_SECRET_LEN {
                    return Err(ConfigError::InvalidValue(format!(
                        "signing.secret must be at least {MIN_HMAC_SECRET_LEN} bytes"
                    )));
                }
            }
            _ => {
                if self.signing.private_key_path.is_some()
                    != self.signing.public_key_path.is_some()
                {
                    return Err(ConfigError::InvalidValue(
                        "signing.private_key_path and signing.public_key_path must be set together"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "http://localhost:8080");
        assert!(config.oauth.refresh_token_rotation);
        assert_eq!(config.signing.algorithm, SigningAlgorithm::RS384);
    }

    #[test]
    fn test_default_config_validates() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_empty_audience_fails_validation() {
        let mut config = AuthConfig::default();
        config.audience.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_hs256_requires_secret() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = SigningAlgorithm::HS256;
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Missing(_)
        ));

        config.signing.secret = Some("short".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("32"));

        config.signing.secret = Some("x".repeat(MIN_HMAC_SECRET_LEN));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_paths_must_be_paired() {
        let mut config = AuthConfig::default();
        config.signing.private_key_path = Some(PathBuf::from("/tmp/key.pem"));
        assert!(config.validate().is_err());

        config.signing.public_key_path = Some(PathBuf::from("/tmp/key.pub.pem"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_lifetime_fails_validation() {
        let mut config = AuthConfig::default();
        config.oauth.access_token_lifetime = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access_token_lifetime"));
    }

    #[test]
    fn test_oauth_default_lifetimes() {
        let oauth = OAuthConfig::default();
        assert_eq!(oauth.authorization_code_lifetime, Duration::from_secs(300));
        assert_eq!(oauth.access_token_lifetime, Duration::from_secs(3600));
        assert_eq!(
            oauth.refresh_token_lifetime,
            Duration::from_secs(60 * 24 * 3600)
        );
        assert_eq!(LaunchConfig::default().token_lifetime, Duration::from_secs(300));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");

        let err = ConfigError::Missing("required_field".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required configuration: required_field"
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            issuer = "https://auth.example.com"

            [oauth]
            access_token_lifetime = "15m"
            refresh_token_rotation = false

            [signing]
            algorithm = "HS256"
            secret = "0123456789abcdef0123456789abcdef"
        "#;

        let config: AuthConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.issuer, "https://auth.example.com");
        assert_eq!(config.oauth.access_token_lifetime, Duration::from_secs(900));
        assert!(!config.oauth.refresh_token_rotation);
        assert_eq!(config.oauth.clock_skew, Duration::from_secs(60));
        assert_eq!(config.signing.algorithm, SigningAlgorithm::HS256);
        assert!(config.validate().is_ok());
    }
}
