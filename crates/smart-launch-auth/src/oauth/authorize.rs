//! Authorization endpoint request and response types.
//!
//! # OAuth 2.0 Authorization Code Flow
//!
//! 1. Client redirects the user to `/authorize` with the request parameters
//! 2. The server validates the request and identifies the resource owner
//! 3. The server redirects back to the client with an authorization code
//! 4. The client exchanges the code at `/token`
//!
//! # SMART on FHIR Extensions
//!
//! - `aud`: FHIR server base URL the token will be used against
//! - `launch`: opaque launch token from an EHR launch

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Authorization request parameters.
///
/// Every field is optional at the type level so that a missing parameter
/// becomes an OAuth error (redirected when possible) instead of a bare
/// deserialization failure.
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=my-app
///   &redirect_uri=https://app.example.com/callback
///   &scope=launch openid fhirUser patient/*.read
///   &state=abc123xyz
///   &aud=https://fhir.example.com/r4
///   &launch=xyz
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthorizationRequest {
    /// Must be "code".
    pub response_type: Option<String>,

    /// Client identifier issued during registration.
    pub client_id: Option<String>,

    /// Must exactly match one of the registered redirect URIs.
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated).
    pub scope: Option<String>,

    /// Opaque client state echoed back on every redirect.
    pub state: Option<String>,

    /// FHIR server base URL (audience).
    pub aud: Option<String>,

    /// EHR launch token.
    pub launch: Option<String>,

    /// PKCE code challenge.
    pub code_challenge: Option<String>,

    /// PKCE code challenge method, `S256` or `plain`.
    pub code_challenge_method: Option<String>,
}

/// Parameters for building an authorization URL on the client side.
#[derive(Debug, Clone)]
pub struct AuthorizationUrlParams {
    /// The server's authorization endpoint.
    pub authorization_endpoint: String,
    /// Client identifier.
    pub client_id: String,
    /// Registered redirect URI.
    pub redirect_uri: String,
    /// Space-separated scopes.
    pub scope: String,
    /// Client state.
    pub state: String,
    /// FHIR server base URL.
    pub aud: String,
    /// PKCE challenge and its method.
    pub code_challenge: Option<(String, String)>,
}

/// Builds the URL a client sends the user to.
///
/// Pure; performs no I/O.
///
/// # Errors
///
/// Returns an error if `authorization_endpoint` is not a valid URL.
pub fn build_authorization_url(
    params: &AuthorizationUrlParams,
    launch: Option<&str>,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&params.authorization_endpoint)?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("response_type", "code")
            .append_pair("client_id", &params.client_id)
            .append_pair("redirect_uri", &params.redirect_uri)
            .append_pair("scope", &params.scope)
            .append_pair("state", &params.state)
            .append_pair("aud", &params.aud);
        if let Some(launch) = launch {
            pairs.append_pair("launch", launch);
        }
        if let Some((challenge, method)) = &params.code_challenge {
            pairs
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", method);
        }
    }
    Ok(url)
}

/// Successful authorization response, delivered by redirect.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    /// Single-use authorization code.
    pub code: String,

    /// Echoed client state.
    pub state: String,
}

impl AuthorizationResponse {
    /// Creates a new authorization response.
    #[must_use]
    pub fn new(code: String, state: String) -> Self {
        Self { code, state }
    }

    /// Builds the redirect URL with response parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is invalid.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = Url::parse(redirect_uri)?;
        url.query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &self.state);
        Ok(url.to_string())
    }
}

/// Authorization error response.
///
/// Delivered by redirect once the redirect URI has been verified.
///
/// ```ignore
/// HTTP/1.1 302 Found
/// Location: https://app.example.com/callback?
///   error=invalid_scope
///   &error_description=No+requested+scope+is+permitted
///   &state=abc123xyz
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationError {
    /// OAuth 2.0 error code.
    pub error: String,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed client state, when the request had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationError {
    /// Builds the redirect payload for `err`.
    #[must_use]
    pub fn from_auth_error(err: &AuthError, state: Option<String>) -> Self {
        Self {
            error: err.oauth_error_code().to_string(),
            error_description: Some(err.public_description()),
            state,
        }
    }

    /// Builds the redirect URL with error parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is invalid.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", &self.error);
            if let Some(ref desc) = self.error_description {
                pairs.append_pair("error_description", desc);
            }
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AuthorizationUrlParams {
        AuthorizationUrlParams {
            authorization_endpoint: "https://auth.example.com/authorize".to_string(),
            client_id: "my-app".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            scope: "launch patient/*.read".to_string(),
            state: "s1".to_string(),
            aud: "https://fhir.example.com/r4".to_string(),
            code_challenge: None,
        }
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_build_authorization_url_without_launch() {
        let url = build_authorization_url(&params(), None).unwrap();
        let pairs = query(&url);

        assert_eq!(url.path(), "/authorize");
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("scope".into(), "launch patient/*.read".into())));
        assert!(pairs.contains(&("aud".into(), "https://fhir.example.com/r4".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "launch"));
        assert!(!pairs.iter().any(|(k, _)| k == "code_challenge"));
    }

    #[test]
    fn test_build_authorization_url_with_launch_and_pkce() {
        let mut params = params();
        params.code_challenge = Some(("abc".to_string(), "S256".to_string()));

        let url = build_authorization_url(&params, Some("xyz")).unwrap();
        let pairs = query(&url);

        assert!(pairs.contains(&("launch".into(), "xyz".into())));
        assert!(pairs.contains(&("code_challenge".into(), "abc".into())));
        assert!(pairs.contains(&("code_challenge_method".into(), "S256".into())));
    }

    #[test]
    fn test_build_authorization_url_parses_back_to_request() {
        let url = build_authorization_url(&params(), Some("xyz")).unwrap();
        let request: AuthorizationRequest =
            serde_json::to_value(query(&url).into_iter().collect::<std::collections::HashMap<_, _>>())
                .and_then(serde_json::from_value)
                .unwrap();

        assert_eq!(request.client_id.as_deref(), Some("my-app"));
        assert_eq!(request.launch.as_deref(), Some("xyz"));
        assert!(request.code_challenge.is_none());
    }

    #[test]
    fn test_build_authorization_url_rejects_bad_endpoint() {
        let mut params = params();
        params.authorization_endpoint = "not a url".to_string();
        assert!(build_authorization_url(&params, None).is_err());
    }

    #[test]
    fn test_authorization_response_to_redirect_url() {
        let response = AuthorizationResponse::new("code123".to_string(), "state456".to_string());
        let url = response
            .to_redirect_url("https://app.example.com/callback")
            .unwrap();

        assert!(url.starts_with("https://app.example.com/callback?"));
        assert!(url.contains("code=code123"));
        assert!(url.contains("state=state456"));
    }

    #[test]
    fn test_redirect_preserves_existing_query() {
        let response = AuthorizationResponse::new("c".to_string(), "s".to_string());
        let url = response
            .to_redirect_url("https://app.example.com/cb?tenant=7")
            .unwrap();
        assert_eq!(url, "https://app.example.com/cb?tenant=7&code=c&state=s");
    }

    #[test]
    fn test_authorization_error_to_redirect_url() {
        let error = AuthorizationError::from_auth_error(
            &AuthError::invalid_scope("Unknown scope"),
            Some("state123".to_string()),
        );

        let url = error
            .to_redirect_url("https://app.example.com/callback")
            .unwrap();

        assert!(url.contains("error=invalid_scope"));
        assert!(url.contains("error_description=Unknown+scope"));
        assert!(url.contains("state=state123"));
    }

    #[test]
    fn test_authorization_error_without_state() {
        let error =
            AuthorizationError::from_auth_error(&AuthError::invalid_request("state is required"), None);
        let url = error
            .to_redirect_url("https://app.example.com/callback")
            .unwrap();
        assert!(!url.contains("state="));
    }

    #[test]
    fn test_server_error_is_generic_in_redirect() {
        let error = AuthorizationError::from_auth_error(
            &AuthError::storage("redis timeout at 10.1.1.1"),
            Some("s".to_string()),
        );
        assert_eq!(error.error, "server_error");
        assert!(!error.error_description.unwrap().contains("10.1.1.1"));
    }
}
