//! HTTP handlers for the OAuth 2.0 and SMART endpoints.
//!
//! # Available Handlers
//!
//! - [`authorize`] - Authorization endpoint
//! - [`token`] - Token endpoint
//! - [`revoke`] - Token revocation endpoint (RFC 7009)
//! - [`discovery`] - `/.well-known/smart-configuration`
//! - [`jwks`] - `/.well-known/jwks.json`
//! - [`launch`] - EHR launch token issuance (optional)
//!
//! [`oauth_router`] mounts all of them over one [`OAuthState`].

pub mod authorize;
pub mod discovery;
pub mod jwks;
pub mod launch;
pub mod owner;
pub mod revoke;
pub mod token;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use url::Url;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::service::{AuthorizationConfig, AuthorizationService};
use crate::oauth::token::TokenErrorResponse;
use crate::smart::launch::LaunchContextManager;
use crate::storage::{ClientRegistry, TokenStore};
use crate::token::{JwtService, TokenConfig, TokenService};

pub use authorize::{AuthorizeState, DROPPED_SCOPES_HEADER, authorize_handler};
pub use discovery::{SmartConfigState, smart_configuration_handler};
pub use jwks::{JwksState, jwks_handler};
pub use launch::{CreateLaunchRequest, CreateLaunchResponse, LaunchState, create_launch_handler};
pub use owner::{HeaderResourceOwnerResolver, ResourceOwnerResolver, TrustedHeaders};
pub use revoke::{RevocationRequest, RevocationState, revoke_handler};
pub use token::{TokenState, token_handler};

// =============================================================================
// State
// =============================================================================

/// Everything the OAuth endpoints need, one state per endpoint.
#[derive(Clone)]
pub struct OAuthState {
    /// `/authorize`
    pub authorize: AuthorizeState,
    /// `/token`
    pub token: TokenState,
    /// `/revoke`
    pub revocation: RevocationState,
    /// `/.well-known/smart-configuration`
    pub smart_config: SmartConfigState,
    /// `/.well-known/jwks.json`
    pub jwks: JwksState,
    /// `/launch`, present only when issuance is enabled.
    pub launch: Option<LaunchState>,
}

impl OAuthState {
    /// Wires the services described by `config` over shared storage.
    ///
    /// `base_url` is the public URL used in the discovery document.
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        base_url: &Url,
        store: Arc<dyn TokenStore>,
        clients: Arc<dyn ClientRegistry>,
        jwt: Arc<JwtService>,
        owner_resolver: Arc<dyn ResourceOwnerResolver>,
    ) -> Self {
        let launches = LaunchContextManager::new(Arc::clone(&store), config.launch.token_lifetime);

        let authorization_service = Arc::new(AuthorizationService::new(
            Arc::clone(&clients),
            Arc::clone(&store),
            launches.clone(),
            AuthorizationConfig::from_auth_config(config),
        ));

        let token_service = Arc::new(TokenService::new(
            store,
            jwt.clone(),
            jwt.clone(),
            TokenConfig::from_auth_config(config),
        ));

        Self {
            authorize: AuthorizeState::new(authorization_service, owner_resolver),
            token: TokenState::new(Arc::clone(&token_service), Arc::clone(&clients))
                .with_public_clients_allowed(config.smart.public_clients_allowed),
            revocation: RevocationState::new(token_service, clients),
            smart_config: SmartConfigState::new(config, base_url),
            jwks: JwksState::new(jwt),
            launch: config
                .launch
                .issuance_enabled
                .then(|| LaunchState::new(launches)),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Builds the router for all OAuth and SMART endpoints.
pub fn oauth_router(state: OAuthState) -> Router {
    let mut router = Router::new()
        .route("/authorize", get(authorize_handler))
        .with_state(state.authorize)
        .merge(
            Router::new()
                .route("/token", post(token_handler))
                .with_state(state.token),
        )
        .merge(
            Router::new()
                .route("/revoke", post(revoke_handler))
                .with_state(state.revocation),
        )
        .merge(
            Router::new()
                .route(
                    "/.well-known/smart-configuration",
                    get(smart_configuration_handler),
                )
                .with_state(state.smart_config),
        )
        .merge(
            Router::new()
                .route("/.well-known/jwks.json", get(jwks_handler))
                .with_state(state.jwks),
        );

    if let Some(launch) = state.launch {
        router = router.merge(
            Router::new()
                .route("/launch", post(create_launch_handler))
                .with_state(launch),
        );
    }

    router
}

// =============================================================================
// Error Response
// =============================================================================

/// Renders an OAuth error as a JSON body.
pub(crate) fn error_response(error: &AuthError) -> Response {
    let body = TokenErrorResponse::from_auth_error(error);
    let status =
        StatusCode::from_u16(body.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if error.is_server_error() {
        tracing::error!(error = %error, "Request failed with a server error");
    }

    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}
