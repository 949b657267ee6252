//! Token endpoint request and response types.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange an authorization code for tokens
//! - `refresh_token` - Obtain a new access token from a refresh token
//!
//! # SMART on FHIR Extensions
//!
//! Token responses carry the launch context next to the token:
//! - `patient`, `encounter` - in-context resource ids
//! - `fhirUser` - the signed-in user's FHIR resource
//! - `fhirContext` - additional resource references (SMART v2)
//! - `need_patient_banner`, `smart_style_url`, `intent`, `tenant`

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;
use crate::smart::launch::FhirContextItem;

/// Token request parameters (`application/x-www-form-urlencoded`).
///
/// Different fields are required depending on the `grant_type`:
///
/// - `authorization_code`: code, redirect_uri, client_id, code_verifier (PKCE)
/// - `refresh_token`: refresh_token, optional scope
///
/// # Client Authentication
///
/// Clients authenticate using one of:
/// - HTTP Basic Auth header (not in this struct)
/// - `client_id` + `client_secret` in body
/// - `client_id` only (public clients)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`.
    #[serde(default)]
    pub grant_type: Option<String>,

    /// Authorization code (for authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (must match authorization request).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (for authorization_code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Client ID (for public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (for client_secret_post authentication).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh token (for refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope (for refresh_token grant, must be subset of original).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Grant types accepted at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant {
    /// `authorization_code`
    AuthorizationCode,
    /// `refresh_token`
    RefreshToken,
}

impl TokenRequest {
    /// Resolves the requested grant type.
    ///
    /// # Errors
    ///
    /// `invalid_request` if `grant_type` is missing, `unsupported_grant_type`
    /// for anything else.
    pub fn grant(&self) -> Result<TokenGrant, AuthError> {
        match self.grant_type.as_deref() {
            Some("authorization_code") => Ok(TokenGrant::AuthorizationCode),
            Some("refresh_token") => Ok(TokenGrant::RefreshToken),
            Some(other) => Err(AuthError::unsupported_grant_type(other)),
            None => Err(AuthError::invalid_request(
                "Missing required parameter: grant_type",
            )),
        }
    }
}

/// Successful token response.
///
/// # Example Response
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "Bearer",
///   "expires_in": 3600,
///   "scope": "launch patient/*.read offline_access",
///   "refresh_token": "abc123...",
///   "patient": "123",
///   "need_patient_banner": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (JWT).
    pub access_token: String,

    /// Token type, always "Bearer".
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes (space-separated).
    pub scope: String,

    /// Refresh token (if offline_access scope was granted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Patient context (FHIR Patient resource ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Encounter context (FHIR Encounter resource ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,

    /// FHIR resource representing the current user.
    #[serde(rename = "fhirUser", default, skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,

    /// Additional FHIR context items (SMART v2).
    #[serde(rename = "fhirContext", default, skip_serializing_if = "Option::is_none")]
    pub fhir_context: Option<Vec<FhirContextItem>>,

    /// Whether to display patient banner in the app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_patient_banner: Option<bool>,

    /// URL to SMART styling information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_style_url: Option<String>,

    /// Launch intent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    /// Tenant identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl TokenResponse {
    /// Creates a new token response with required fields.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
            patient: None,
            encounter: None,
            fhir_user: None,
            fhir_context: None,
            need_patient_banner: None,
            smart_style_url: None,
            intent: None,
            tenant: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Token error response.
///
/// ```json
/// {
///   "error": "invalid_grant",
///   "error_description": "Invalid authorization code"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    /// OAuth 2.0 error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// Builds the response body for `err`.
    #[must_use]
    pub fn from_auth_error(err: &AuthError) -> Self {
        Self {
            error: err.oauth_error_code().to_string(),
            error_description: Some(err.public_description()),
        }
    }

    /// HTTP status for this error.
    ///
    /// `invalid_client` is 401, `server_error` is 500, everything else 400.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.error.as_str() {
            "invalid_client" => 401,
            "server_error" => 500,
            _ => 400,
        }
    }
}

impl From<&AuthError> for TokenErrorResponse {
    fn from(err: &AuthError) -> Self {
        Self::from_auth_error(err)
    }
}

impl fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_deserialization() {
        let json = r#"{
            "grant_type": "authorization_code",
            "code": "SplxlOBeZQQYbYS6WxSbIA",
            "redirect_uri": "https://app.example.com/callback",
            "code_verifier": "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk",
            "client_id": "my-app"
        }"#;

        let request: TokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.grant().unwrap(), TokenGrant::AuthorizationCode);
        assert_eq!(request.code.as_deref(), Some("SplxlOBeZQQYbYS6WxSbIA"));
        assert_eq!(
            request.code_verifier.as_deref(),
            Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk")
        );
        assert!(request.client_secret.is_none());
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_token_request_refresh_grant() {
        let json = r#"{
            "grant_type": "refresh_token",
            "refresh_token": "tGzv3JOkF0XG5Qx2TlKWIA",
            "client_id": "my-app",
            "scope": "patient/*.read"
        }"#;

        let request: TokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.grant().unwrap(), TokenGrant::RefreshToken);
        assert_eq!(request.scope.as_deref(), Some("patient/*.read"));
    }

    #[test]
    fn test_token_request_grant_errors() {
        let missing = TokenRequest::default();
        assert_eq!(
            missing.grant().unwrap_err().oauth_error_code(),
            "invalid_request"
        );

        let unsupported = TokenRequest {
            grant_type: Some("client_credentials".to_string()),
            ..TokenRequest::default()
        };
        assert_eq!(
            unsupported.grant().unwrap_err().oauth_error_code(),
            "unsupported_grant_type"
        );
    }

    #[test]
    fn test_token_response_serialization() {
        let response = TokenResponse::new(
            "eyJhbGciOiJSUzM4NCJ9...".to_string(),
            3600,
            "launch patient/*.read".to_string(),
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3600);
        assert_eq!(json["scope"], "launch patient/*.read");
        for absent in ["refresh_token", "patient", "encounter", "fhirUser", "fhirContext"] {
            assert!(json.get(absent).is_none(), "{absent}");
        }
    }

    #[test]
    fn test_token_response_context_fields() {
        let mut response = TokenResponse::new("at".to_string(), 3600, "launch".to_string())
            .with_refresh_token("rt".to_string());
        response.patient = Some("123".to_string());
        response.fhir_user = Some("Practitioner/9".to_string());
        response.fhir_context = Some(vec![FhirContextItem::new("DiagnosticReport/7")]);
        response.need_patient_banner = Some(false);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["refresh_token"], "rt");
        assert_eq!(json["patient"], "123");
        assert_eq!(json["fhirUser"], "Practitioner/9");
        assert_eq!(json["fhirContext"][0]["reference"], "DiagnosticReport/7");
        assert_eq!(json["need_patient_banner"], false);
    }

    #[test]
    fn test_token_error_response() {
        let error = TokenErrorResponse::from_auth_error(&AuthError::invalid_grant(
            "Invalid authorization code",
        ));

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["error"], "invalid_grant");
        assert_eq!(json["error_description"], "Invalid authorization code");
        assert_eq!(error.http_status(), 400);
    }

    #[test]
    fn test_token_error_http_status() {
        let client = TokenErrorResponse::from(&AuthError::invalid_client("bad secret"));
        assert_eq!(client.http_status(), 401);

        let server = TokenErrorResponse::from(&AuthError::storage("down"));
        assert_eq!(server.error, "server_error");
        assert_eq!(server.http_status(), 500);
    }
}
