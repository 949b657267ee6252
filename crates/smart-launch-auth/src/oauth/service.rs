//! OAuth authorization service.
//!
//! Validates authorization requests, resolves EHR launch context and issues
//! authorization codes.
//!
//! # Failure delivery
//!
//! Until the client and its redirect URI are confirmed, failures are
//! [`AuthorizeFailure::Direct`] and must be shown to the user agent. After
//! that they are [`AuthorizeFailure::Redirect`] and go back to the client
//! with `error`, `error_description` and `state`.
//!
//! # Usage
//!
//! ```ignore
//! let service = AuthorizationService::new(clients, store, launches, config);
//!
//! match service.handle_authorization_request(&request, Some(&owner)).await {
//!     Ok(grant) => redirect(grant.redirect_url()?),
//!     Err(AuthorizeFailure::Redirect { .. }) => ...,
//!     Err(AuthorizeFailure::Direct(err)) => ...,
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::authorize::{AuthorizationError, AuthorizationRequest, AuthorizationResponse};
use crate::oauth::code::{AuthorizationCode, CODE_NAMESPACE};
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod};
use crate::smart::launch::{LaunchContext, LaunchContextManager};
use crate::smart::scopes::{DroppedScope, ScopeSet, filter_scopes_by_permissions};
use crate::storage::{ClientRegistry, NamespacedStore, TokenStore};
use crate::token::{generate_opaque_token, hash_token};
use crate::types::{Client, GrantType, ResourceOwner};

/// Configuration for the authorization service.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Authorization code lifetime.
    pub code_lifetime: Duration,

    /// Accepted `aud` values.
    pub audience: Vec<String>,

    /// Reject requests without `aud`.
    pub require_aud: bool,

    /// Accept `code_challenge_method=plain`.
    pub allow_plain_pkce: bool,

    /// Reject public clients that send no PKCE challenge.
    pub require_pkce_for_public_clients: bool,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self::from_auth_config(&AuthConfig::default())
    }
}

impl AuthorizationConfig {
    /// Extracts the authorization settings from the server configuration.
    #[must_use]
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            code_lifetime: config.oauth.authorization_code_lifetime,
            audience: config.audience.clone(),
            require_aud: config.oauth.require_aud,
            allow_plain_pkce: config.oauth.allow_plain_pkce,
            require_pkce_for_public_clients: config.oauth.require_pkce_for_public_clients,
        }
    }

    fn is_accepted_audience(&self, aud: &str) -> bool {
        let aud = aud.trim_end_matches('/');
        self.audience
            .iter()
            .any(|allowed| allowed.trim_end_matches('/') == aud)
    }
}

/// A successfully issued authorization code.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    /// The code value. Only ever sent to the client.
    pub code: String,

    /// Verified redirect URI.
    pub redirect_uri: String,

    /// Echoed client state.
    pub state: String,

    /// Scopes bound to the code.
    pub granted_scope: ScopeSet,

    /// Requested scopes that were left out.
    pub dropped_scopes: Vec<DroppedScope>,

    /// Absolute code expiry.
    pub expires_at: OffsetDateTime,
}

impl AuthorizationGrant {
    /// The redirect carrying `code` and `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI is invalid.
    pub fn redirect_url(&self) -> Result<String, url::ParseError> {
        AuthorizationResponse::new(self.code.clone(), self.state.clone())
            .to_redirect_url(&self.redirect_uri)
    }
}

/// Why an authorization request failed, and how to tell the client.
#[derive(Debug)]
pub enum AuthorizeFailure {
    /// The redirect URI is not trusted; render the error directly.
    Direct(AuthError),

    /// Redirect the error to the client's verified redirect URI.
    Redirect {
        /// Verified redirect URI.
        redirect_uri: String,
        /// Client state, if supplied.
        state: Option<String>,
        /// The failure.
        error: AuthError,
    },
}

impl AuthorizeFailure {
    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &AuthError {
        match self {
            Self::Direct(error) | Self::Redirect { error, .. } => error,
        }
    }

    /// The error redirect, or `None` for direct failures.
    #[must_use]
    pub fn redirect_url(&self) -> Option<Result<String, url::ParseError>> {
        match self {
            Self::Direct(_) => None,
            Self::Redirect {
                redirect_uri,
                state,
                error,
            } => Some(
                AuthorizationError::from_auth_error(error, state.clone())
                    .to_redirect_url(redirect_uri),
            ),
        }
    }
}

/// Authorization service for handling OAuth 2.0 authorization requests.
pub struct AuthorizationService {
    clients: Arc<dyn ClientRegistry>,
    codes: NamespacedStore<AuthorizationCode>,
    launches: LaunchContextManager,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    /// Creates a new authorization service.
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientRegistry>,
        store: Arc<dyn TokenStore>,
        launches: LaunchContextManager,
        config: AuthorizationConfig,
    ) -> Self {
        Self {
            clients,
            codes: NamespacedStore::new(store, CODE_NAMESPACE),
            launches,
            config,
        }
    }

    /// Gets the service configuration.
    #[must_use]
    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// Processes an authorization request for an authenticated resource owner.
    ///
    /// `owner` is `None` when no user session could be established.
    ///
    /// # Errors
    ///
    /// Direct failures:
    /// - missing `client_id` or `redirect_uri` (`invalid_request`)
    /// - unknown or inactive client (`invalid_client`)
    /// - redirect URI not registered (`invalid_request`)
    ///
    /// Redirected failures:
    /// - `response_type` other than `code` (`unsupported_response_type`)
    /// - client may not use the code grant (`unauthorized_client`)
    /// - missing `state`, bad `aud`, bad PKCE parameters (`invalid_request`)
    /// - no requested scope permitted (`invalid_scope`)
    /// - no resource owner (`access_denied`)
    /// - unknown, expired or used launch token (`invalid_request`)
    /// - store failure (`server_error`)
    pub async fn handle_authorization_request(
        &self,
        request: &AuthorizationRequest,
        owner: Option<&ResourceOwner>,
    ) -> Result<AuthorizationGrant, AuthorizeFailure> {
        // 1. Identify the client
        let client = self
            .lookup_client(request.client_id.as_deref())
            .await
            .map_err(AuthorizeFailure::Direct)?;

        // 2. Verify redirect_uri
        let redirect_uri = match request.redirect_uri.as_deref() {
            Some(uri) if client.is_redirect_uri_allowed(uri) => uri.to_string(),
            Some(_) => {
                tracing::warn!(client_id = %client.client_id, "Unregistered redirect_uri");
                return Err(AuthorizeFailure::Direct(AuthError::invalid_request(
                    "redirect_uri is not registered for this client",
                )));
            }
            None => {
                return Err(AuthorizeFailure::Direct(AuthError::invalid_request(
                    "Missing required parameter: redirect_uri",
                )));
            }
        };

        // 3. Everything else is reported to the client
        self.authorize_verified(&client, &redirect_uri, request, owner)
            .await
            .map_err(|error| {
                tracing::info!(
                    client_id = %client.client_id,
                    error = %error.oauth_error_code(),
                    category = %error.category(),
                    "Authorization request rejected"
                );
                AuthorizeFailure::Redirect {
                    redirect_uri: redirect_uri.clone(),
                    state: request.state.clone(),
                    error,
                }
            })
    }

    async fn lookup_client(&self, client_id: Option<&str>) -> AuthResult<Client> {
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::invalid_request("Missing required parameter: client_id"))?;

        let client = self
            .clients
            .find_by_client_id(client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

        if !client.active {
            return Err(AuthError::invalid_client("Client is inactive"));
        }
        Ok(client)
    }

    async fn authorize_verified(
        &self,
        client: &Client,
        redirect_uri: &str,
        request: &AuthorizationRequest,
        owner: Option<&ResourceOwner>,
    ) -> AuthResult<AuthorizationGrant> {
        // 3a. response_type
        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => return Err(AuthError::unsupported_response_type(other)),
            None => {
                return Err(AuthError::invalid_request(
                    "Missing required parameter: response_type",
                ));
            }
        }

        // 3b. grant type
        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "Client is not authorized for the authorization_code grant",
            ));
        }

        // 3c. state
        let state = request
            .state
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::invalid_request("Missing required parameter: state"))?;

        // 3d. aud
        match request.aud.as_deref() {
            Some(aud) if !self.config.is_accepted_audience(aud) => {
                return Err(AuthError::invalid_request(
                    "aud does not identify a resource server served by this authorization server",
                ));
            }
            None if self.config.require_aud => {
                return Err(AuthError::invalid_request("Missing required parameter: aud"));
            }
            _ => {}
        }

        // 3e. PKCE
        let pkce = self.validate_pkce(client, request)?;

        // 3f. scopes
        let outcome = filter_scopes_by_permissions(
            request.scope.as_deref().unwrap_or_default(),
            &client.allowed_scopes(),
        );
        for dropped in &outcome.dropped {
            tracing::debug!(
                client_id = %client.client_id,
                scope = %dropped.scope,
                reason = dropped.reason.as_str(),
                "Dropped requested scope"
            );
        }
        if outcome.granted.is_empty() {
            return Err(AuthError::invalid_scope(
                "None of the requested scopes are permitted for this client",
            ));
        }

        // 3g. resource owner
        let owner = owner
            .ok_or_else(|| AuthError::access_denied("The resource owner is not authenticated"))?;

        // 4. launch context
        let launch_context = match request.launch.as_deref() {
            Some(launch) => self
                .launches
                .consume_launch_token_for_client(launch, &client.client_id)
                .await
                .map_err(|e| match e {
                    AuthError::InvalidGrant { .. } => {
                        AuthError::invalid_request("Invalid or expired launch parameter")
                    }
                    other => other,
                })?,
            None => LaunchContext::default(),
        };
        let context = launch_context.merge_requested(owner);
        context.validate()?;

        // 5. issue code
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.config.code_lifetime;
        let code = generate_opaque_token();
        let record = AuthorizationCode {
            client_id: client.client_id.clone(),
            redirect_uri: redirect_uri.to_string(),
            scope: outcome.granted.clone(),
            subject: owner.subject.clone(),
            context,
            pkce,
            created_at: now,
            expires_at,
        };
        self.codes
            .put(&hash_token(&code), &record, self.config.code_lifetime)
            .await?;

        tracing::info!(
            client_id = %client.client_id,
            scope = %outcome.granted,
            dropped = outcome.dropped.len(),
            ehr_launch = request.launch.is_some(),
            "Issued authorization code"
        );

        Ok(AuthorizationGrant {
            code,
            redirect_uri: redirect_uri.to_string(),
            state,
            granted_scope: outcome.granted,
            dropped_scopes: outcome.dropped,
            expires_at,
        })
    }

    fn validate_pkce(
        &self,
        client: &Client,
        request: &AuthorizationRequest,
    ) -> AuthResult<Option<PkceChallenge>> {
        let Some(challenge) = request.code_challenge.as_deref() else {
            if request.code_challenge_method.is_some() {
                return Err(AuthError::invalid_request(
                    "code_challenge_method requires code_challenge",
                ));
            }
            if !client.confidential && self.config.require_pkce_for_public_clients {
                return Err(AuthError::invalid_request(
                    "PKCE (code_challenge) is required for public clients",
                ));
            }
            if client.confidential {
                tracing::debug!(client_id = %client.client_id, "Confidential client is not using PKCE");
            }
            return Ok(None);
        };

        let method = PkceChallengeMethod::parse(request.code_challenge_method.as_deref())?;
        if method == PkceChallengeMethod::Plain && !self.config.allow_plain_pkce {
            return Err(AuthError::invalid_request(
                "code_challenge_method plain is not allowed, use S256",
            ));
        }

        Ok(Some(PkceChallenge::new(challenge.to_string(), method)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::pkce::PkceVerifier;
    use crate::smart::launch::DEFAULT_LAUNCH_TOKEN_TTL;
    use crate::storage::{InMemoryClientRegistry, MemoryTokenStore};

    const REDIRECT: &str = "https://app.example.com/callback";
    const AUD: &str = "https://fhir.example.com/r4";

    fn public_client() -> Client {
        Client {
            client_id: "growth-chart".to_string(),
            name: "Growth Chart".to_string(),
            client_secret_hash: None,
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            redirect_uris: vec![REDIRECT.to_string()],
            scopes: vec![
                "launch".to_string(),
                "launch/patient".to_string(),
                "openid".to_string(),
                "fhirUser".to_string(),
                "offline_access".to_string(),
                "patient/*.read".to_string(),
            ],
            confidential: false,
            active: true,
        }
    }

    struct Fixture {
        service: AuthorizationService,
        store: Arc<dyn TokenStore>,
        launches: LaunchContextManager,
    }

    fn fixture_with(clients: Vec<Client>, config: AuthorizationConfig) -> Fixture {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let launches = LaunchContextManager::new(Arc::clone(&store), DEFAULT_LAUNCH_TOKEN_TTL);
        let registry = Arc::new(InMemoryClientRegistry::new(clients).unwrap());
        let service =
            AuthorizationService::new(registry, Arc::clone(&store), launches.clone(), config);
        Fixture {
            service,
            store,
            launches,
        }
    }

    fn fixture() -> Fixture {
        let config = AuthorizationConfig {
            audience: vec![AUD.to_string()],
            ..AuthorizationConfig::default()
        };
        fixture_with(vec![public_client()], config)
    }

    fn request() -> AuthorizationRequest {
        let verifier = PkceVerifier::generate();
        AuthorizationRequest {
            response_type: Some("code".to_string()),
            client_id: Some("growth-chart".to_string()),
            redirect_uri: Some(REDIRECT.to_string()),
            scope: Some("launch/patient patient/*.read".to_string()),
            state: Some("af0ifjsldkj".to_string()),
            aud: Some(AUD.to_string()),
            launch: None,
            code_challenge: Some(PkceChallenge::from_verifier(&verifier).as_str().to_string()),
            code_challenge_method: Some("S256".to_string()),
        }
    }

    fn owner() -> ResourceOwner {
        ResourceOwner {
            fhir_user: Some("Practitioner/9".to_string()),
            selected_patient: Some("456".to_string()),
            ..ResourceOwner::new("user-1")
        }
    }

    fn redirect_code(failure: &AuthorizeFailure) -> Option<&'static str> {
        match failure {
            AuthorizeFailure::Redirect { error, .. } => Some(error.oauth_error_code()),
            AuthorizeFailure::Direct(_) => None,
        }
    }

    async fn stored_code(f: &Fixture, code: &str) -> AuthorizationCode {
        let codes: NamespacedStore<AuthorizationCode> =
            NamespacedStore::new(Arc::clone(&f.store), CODE_NAMESPACE);
        codes.get(&hash_token(code)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_authorize_success() {
        let f = fixture();
        let grant = f
            .service
            .handle_authorization_request(&request(), Some(&owner()))
            .await
            .unwrap();

        assert_eq!(grant.code.len(), 43);
        assert_eq!(grant.state, "af0ifjsldkj");
        assert_eq!(grant.granted_scope.to_string(), "launch/patient patient/*.read");
        assert!(grant.dropped_scopes.is_empty());

        let url = grant.redirect_url().unwrap();
        assert!(url.starts_with(REDIRECT));
        assert!(url.contains("state=af0ifjsldkj"));

        let record = stored_code(&f, &grant.code).await;
        assert_eq!(record.subject, "user-1");
        assert_eq!(record.context.patient.as_deref(), Some("456"));
        assert_eq!(record.pkce.unwrap().method(), PkceChallengeMethod::S256);
    }

    #[tokio::test]
    async fn test_unknown_client_is_direct() {
        let f = fixture();
        let mut req = request();
        req.client_id = Some("nobody".to_string());

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert!(matches!(failure, AuthorizeFailure::Direct(_)));
        assert_eq!(failure.error().oauth_error_code(), "invalid_client");
        assert!(failure.redirect_url().is_none());
    }

    #[tokio::test]
    async fn test_inactive_client_is_direct() {
        let mut client = public_client();
        client.active = false;
        let f = fixture_with(vec![client], AuthorizationConfig::default());

        let failure = f
            .service
            .handle_authorization_request(&request(), Some(&owner()))
            .await
            .unwrap_err();
        assert!(matches!(failure, AuthorizeFailure::Direct(_)));
    }

    #[tokio::test]
    async fn test_mismatched_redirect_uri_is_direct() {
        let f = fixture();
        for uri in [
            "https://app.example.com/callback/",
            "https://evil.example.com/callback",
            "https://app.example.com/callback?x=1",
        ] {
            let mut req = request();
            req.redirect_uri = Some(uri.to_string());

            let failure = f
                .service
                .handle_authorization_request(&req, Some(&owner()))
                .await
                .unwrap_err();
            assert!(matches!(failure, AuthorizeFailure::Direct(_)), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unsupported_response_type_is_redirected() {
        let f = fixture();
        let mut req = request();
        req.response_type = Some("token".to_string());

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("unsupported_response_type"));

        let url = failure.redirect_url().unwrap().unwrap();
        assert!(url.contains("error=unsupported_response_type"));
        assert!(url.contains("state=af0ifjsldkj"));
    }

    #[tokio::test]
    async fn test_client_without_code_grant() {
        let mut client = public_client();
        client.grant_types = vec![GrantType::RefreshToken];
        let f = fixture_with(
            vec![client],
            AuthorizationConfig {
                audience: vec![AUD.to_string()],
                ..AuthorizationConfig::default()
            },
        );

        let failure = f
            .service
            .handle_authorization_request(&request(), Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("unauthorized_client"));
    }

    #[tokio::test]
    async fn test_missing_state() {
        let f = fixture();
        let mut req = request();
        req.state = None;

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_aud_must_match() {
        let f = fixture();
        let mut req = request();
        req.aud = Some("https://other.example.com/fhir".to_string());

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));

        req.aud = None;
        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_aud_trailing_slash_tolerated() {
        let f = fixture();
        let mut req = request();
        req.aud = Some(format!("{AUD}/"));

        assert!(
            f.service
                .handle_authorization_request(&req, Some(&owner()))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_public_client_requires_pkce() {
        let f = fixture();
        let mut req = request();
        req.code_challenge = None;
        req.code_challenge_method = None;

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_plain_pkce_respects_config() {
        let verifier = PkceVerifier::generate();
        let mut req = request();
        req.code_challenge = Some(verifier.as_str().to_string());
        req.code_challenge_method = Some("plain".to_string());

        let f = fixture();
        let grant = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap();
        let record = stored_code(&f, &grant.code).await;
        assert_eq!(record.pkce.unwrap().method(), PkceChallengeMethod::Plain);

        let strict = fixture_with(
            vec![public_client()],
            AuthorizationConfig {
                audience: vec![AUD.to_string()],
                allow_plain_pkce: false,
                ..AuthorizationConfig::default()
            },
        );
        let failure = strict
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_malformed_pkce_challenge() {
        let f = fixture();
        let mut req = request();
        req.code_challenge = Some("short".to_string());

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_scopes_are_filtered() {
        let f = fixture();
        let mut req = request();
        req.scope = Some("patient/*.read user/*.write bogus".to_string());

        let grant = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap();
        assert_eq!(grant.granted_scope.to_string(), "patient/*.read");

        let dropped: Vec<_> = grant.dropped_scopes.iter().map(|d| d.scope.as_str()).collect();
        assert_eq!(dropped, vec!["user/*.write", "bogus"]);
    }

    #[tokio::test]
    async fn test_no_permitted_scope_is_invalid_scope() {
        let f = fixture();
        let mut req = request();
        req.scope = Some("system/*.read".to_string());

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_scope"));
    }

    #[tokio::test]
    async fn test_unauthenticated_owner_is_access_denied() {
        let f = fixture();
        let failure = f
            .service
            .handle_authorization_request(&request(), None)
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("access_denied"));
    }

    #[tokio::test]
    async fn test_ehr_launch_context_wins() {
        let f = fixture();
        let issued = f
            .launches
            .issue_launch_token(
                "growth-chart",
                LaunchContext::for_patient("123").with_encounter("e1"),
                None,
            )
            .await
            .unwrap();

        let mut req = request();
        req.scope = Some("launch patient/*.read".to_string());
        req.launch = Some(issued.launch.clone());

        let grant = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap();
        let record = stored_code(&f, &grant.code).await;
        assert_eq!(record.context.patient.as_deref(), Some("123"));
        assert_eq!(record.context.encounter.as_deref(), Some("e1"));
        assert_eq!(record.context.fhir_user.as_deref(), Some("Practitioner/9"));

        // launch tokens are single-use
        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_unknown_launch_is_invalid_request() {
        let f = fixture();
        let mut req = request();
        req.launch = Some("never-issued".to_string());

        let failure = f
            .service
            .handle_authorization_request(&req, Some(&owner()))
            .await
            .unwrap_err();
        assert_eq!(redirect_code(&failure), Some("invalid_request"));
    }

    #[tokio::test]
    async fn test_denied_request_does_not_burn_launch() {
        let f = fixture();
        let issued = f
            .launches
            .issue_launch_token("growth-chart", LaunchContext::for_patient("123"), None)
            .await
            .unwrap();

        let mut req = request();
        req.launch = Some(issued.launch.clone());
        assert!(
            f.service
                .handle_authorization_request(&req, None)
                .await
                .is_err()
        );

        assert!(
            f.service
                .handle_authorization_request(&req, Some(&owner()))
                .await
                .is_ok()
        );
    }
}
