//! OAuth 2.0 Token endpoint handler.
//!
//! Supports the following grant types:
//!
//! - `authorization_code` - Exchange authorization code for tokens
//! - `refresh_token` - Refresh an access token
//!
//! # Example
//!
//! ```ignore
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! &code_verifier=dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk
//! &client_id=my-app
//! ```

use std::sync::Arc;

use axum::Form;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use super::error_response;
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::client_auth::{
    AuthenticatedClient, BodyCredentials, TokenEndpointAuthMethod, authenticate_client,
    parse_basic_auth,
};
use crate::oauth::token::{TokenGrant, TokenRequest, TokenResponse};
use crate::storage::ClientRegistry;
use crate::token::TokenService;
use crate::types::GrantType;

/// State required for the token endpoint.
#[derive(Clone)]
pub struct TokenState {
    /// Token service for exchanging codes and refresh tokens.
    pub token_service: Arc<TokenService>,
    /// Registered clients.
    pub clients: Arc<dyn ClientRegistry>,
    /// Whether clients without a secret may use the endpoint.
    pub public_clients_allowed: bool,
}

impl TokenState {
    /// Creates a new token state.
    pub fn new(token_service: Arc<TokenService>, clients: Arc<dyn ClientRegistry>) -> Self {
        Self {
            token_service,
            clients,
            public_clients_allowed: true,
        }
    }

    /// Sets whether public clients are accepted.
    #[must_use]
    pub fn with_public_clients_allowed(mut self, allowed: bool) -> Self {
        self.public_clients_allowed = allowed;
        self
    }
}

/// Maps a form extraction failure to `invalid_request`.
pub(crate) fn form_rejection_error(rejection: &FormRejection) -> AuthError {
    match rejection {
        FormRejection::InvalidFormContentType(_) => AuthError::invalid_request(
            "Content-Type must be application/x-www-form-urlencoded",
        ),
        _ => AuthError::invalid_request("Malformed form body"),
    }
}

/// Handler for `POST /token`.
///
/// # Client Authentication
///
/// - HTTP Basic Auth header: `Authorization: Basic <base64(client_id:client_secret)>`
/// - Request body: `client_id` and `client_secret` parameters
/// - Public client: just `client_id` (the code must be PKCE-bound)
///
/// # Responses
///
/// - 200 with a [`TokenResponse`]
/// - 400 for grant, scope and request errors, including an unreadable body
/// - 401 for client authentication failures
/// - 500 when the store is unavailable
pub async fn token_handler(
    State(state): State<TokenState>,
    headers: HeaderMap,
    request: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match request {
        Ok(Form(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed token request body");
            return error_response(&form_rejection_error(&rejection));
        }
    };

    debug!(
        grant_type = ?request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

    let basic = basic_credentials(&headers);
    let client = match authenticate(&state, &request, basic.as_ref()).await {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Client authentication failed");
            let mut response = error_response(&e);
            if basic.is_some() && matches!(e, AuthError::InvalidClient { .. }) {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    header::HeaderValue::from_static("Basic"),
                );
            }
            return response;
        }
    };

    let client_id = client.client.client_id.clone();
    match process_grant(&state, &request, &client).await {
        Ok(response) => {
            info!(
                client_id = %client_id,
                grant_type = ?request.grant_type,
                "Token issued successfully"
            );
            token_success_response(response)
        }
        Err(e) => {
            warn!(
                client_id = %client_id,
                grant_type = ?request.grant_type,
                error = %e,
                "Token request failed"
            );
            error_response(&e)
        }
    }
}

/// Decoded Basic credentials from the `Authorization` header.
pub(crate) fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic_auth)
}

async fn authenticate(
    state: &TokenState,
    request: &TokenRequest,
    basic: Option<&(String, String)>,
) -> AuthResult<AuthenticatedClient> {
    let body = BodyCredentials {
        client_id: request.client_id.as_deref(),
        client_secret: request.client_secret.as_deref(),
    };
    let basic = basic.map(|(id, secret)| (id.as_str(), secret.as_str()));

    let client = authenticate_client(body, basic, state.clients.as_ref()).await?;
    if client.auth_method == TokenEndpointAuthMethod::None && !state.public_clients_allowed {
        return Err(AuthError::invalid_client("Public clients are not allowed"));
    }
    Ok(client)
}

async fn process_grant(
    state: &TokenState,
    request: &TokenRequest,
    client: &AuthenticatedClient,
) -> AuthResult<TokenResponse> {
    let grant = request.grant()?;
    let client_id = client.client.client_id.as_str();

    match grant {
        TokenGrant::AuthorizationCode => {
            ensure_grant_allowed(client, GrantType::AuthorizationCode)?;

            let code = required(request.code.as_deref(), "code")?;
            let redirect_uri = required(request.redirect_uri.as_deref(), "redirect_uri")?;

            state
                .token_service
                .exchange_code(
                    code,
                    request.code_verifier.as_deref(),
                    client_id,
                    redirect_uri,
                )
                .await
        }
        TokenGrant::RefreshToken => {
            if !state.token_service.config().refresh_tokens_enabled {
                return Err(AuthError::unsupported_grant_type("refresh_token"));
            }
            ensure_grant_allowed(client, GrantType::RefreshToken)?;

            let refresh_token = required(request.refresh_token.as_deref(), "refresh_token")?;

            state
                .token_service
                .refresh_token(refresh_token, client_id, request.scope.as_deref())
                .await
        }
    }
}

fn ensure_grant_allowed(client: &AuthenticatedClient, grant_type: GrantType) -> AuthResult<()> {
    if client.client.is_grant_type_allowed(grant_type) {
        Ok(())
    } else {
        Err(AuthError::unauthorized_client(format!(
            "Client is not allowed to use the {} grant",
            grant_type.as_str()
        )))
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> AuthResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("Missing required parameter: {name}")))
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}
