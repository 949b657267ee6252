//! SMART configuration discovery document.
//!
//! Served at `/.well-known/smart-configuration` so apps can find the
//! authorization server's endpoints and capabilities.
//!
//! # References
//!
//! - [SMART Configuration](https://build.fhir.org/ig/HL7/smart-app-launch/conformance.html)

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{AuthConfig, SmartConfig};
use crate::oauth::pkce::PkceChallengeMethod;

/// SMART configuration document.
///
/// # Example Response
///
/// ```json
/// {
///   "issuer": "https://auth.example.com",
///   "jwks_uri": "https://auth.example.com/.well-known/jwks.json",
///   "authorization_endpoint": "https://auth.example.com/authorize",
///   "token_endpoint": "https://auth.example.com/token",
///   "grant_types_supported": ["authorization_code", "refresh_token"],
///   "code_challenge_methods_supported": ["S256"],
///   "capabilities": ["launch-ehr", "client-public", "permission-v2"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartConfiguration {
    /// Issuer URL, matching the `iss` claim of issued tokens.
    pub issuer: String,

    /// URL to the server's JSON Web Key Set.
    pub jwks_uri: String,

    /// URL to the OAuth 2.0 Authorization endpoint.
    pub authorization_endpoint: String,

    /// URL to the OAuth 2.0 Token endpoint.
    pub token_endpoint: String,

    /// Token revocation endpoint (RFC 7009).
    pub revocation_endpoint: String,

    /// Supported grant types.
    pub grant_types_supported: Vec<String>,

    /// Supported OAuth scopes.
    pub scopes_supported: Vec<String>,

    /// Supported response types.
    pub response_types_supported: Vec<String>,

    /// Supported PKCE code challenge methods.
    pub code_challenge_methods_supported: Vec<String>,

    /// Supported token endpoint authentication methods.
    pub token_endpoint_auth_methods_supported: Vec<String>,

    /// SMART capabilities advertised by this server.
    pub capabilities: Vec<String>,
}

impl SmartConfiguration {
    /// Builds the document from configuration.
    ///
    /// `base_url` is the public URL the server is reachable at; endpoint URLs
    /// are derived from it rather than from the bind address.
    #[must_use]
    pub fn build(config: &AuthConfig, base_url: &Url) -> Self {
        let base = base_url.as_str().trim_end_matches('/');

        let mut grant_types = vec!["authorization_code".to_string()];
        if config.smart.refresh_tokens_enabled {
            grant_types.push("refresh_token".to_string());
        }

        let mut challenge_methods = vec![PkceChallengeMethod::S256.as_str().to_string()];
        if config.oauth.allow_plain_pkce {
            challenge_methods.push(PkceChallengeMethod::Plain.as_str().to_string());
        }

        Self {
            issuer: config.issuer.clone(),
            jwks_uri: format!("{base}/.well-known/jwks.json"),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            revocation_endpoint: format!("{base}/revoke"),
            grant_types_supported: grant_types,
            scopes_supported: config.smart.supported_scopes.clone(),
            response_types_supported: vec!["code".to_string()],
            code_challenge_methods_supported: challenge_methods,
            token_endpoint_auth_methods_supported: Self::build_token_auth_methods(&config.smart),
            capabilities: Self::build_capabilities(&config.smart),
        }
    }

    /// Builds the capabilities list based on SMART configuration.
    fn build_capabilities(smart: &SmartConfig) -> Vec<String> {
        let mut caps = vec!["permission-v2".to_string()];

        if smart.launch_ehr_enabled {
            caps.push("launch-ehr".to_string());
            caps.push("context-ehr-patient".to_string());
            caps.push("context-ehr-encounter".to_string());
        }

        if smart.launch_standalone_enabled {
            caps.push("launch-standalone".to_string());
            caps.push("context-standalone-patient".to_string());
            caps.push("context-standalone-encounter".to_string());
        }

        if smart.public_clients_allowed {
            caps.push("client-public".to_string());
        }

        if smart.confidential_symmetric_allowed {
            caps.push("client-confidential-symmetric".to_string());
        }

        if smart.refresh_tokens_enabled {
            caps.push("permission-offline".to_string());
        }

        if smart.openid_enabled {
            caps.push("sso-openid-connect".to_string());
        }

        caps.push("permission-patient".to_string());
        caps.push("permission-user".to_string());

        caps
    }

    fn build_token_auth_methods(smart: &SmartConfig) -> Vec<String> {
        let mut methods = Vec::new();

        if smart.confidential_symmetric_allowed {
            methods.push("client_secret_basic".to_string());
            methods.push("client_secret_post".to_string());
        }

        if smart.public_clients_allowed {
            methods.push("none".to_string());
        }

        methods
    }
}
