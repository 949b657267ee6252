//! Token revocation endpoint (RFC 7009).
//!
//! ```text
//! POST /revoke
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! token=45ghiukldjahdnhzdauz&token_type_hint=refresh_token
//! ```
//!
//! Unknown tokens and tokens issued to other clients still answer 200 so the
//! endpoint cannot be used to probe token validity.

use std::sync::Arc;

use axum::Form;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{info, warn};

use super::error_response;
use super::token::{basic_credentials, form_rejection_error};
use crate::error::AuthError;
use crate::oauth::client_auth::{BodyCredentials, authenticate_client};
use crate::storage::ClientRegistry;
use crate::token::{TokenService, TokenTypeHint};

/// State required for the revocation endpoint.
#[derive(Clone)]
pub struct RevocationState {
    /// Token service owning refresh tokens and revoked `jti`s.
    pub token_service: Arc<TokenService>,
    /// Registered clients.
    pub clients: Arc<dyn ClientRegistry>,
}

impl RevocationState {
    /// Creates a new revocation state.
    pub fn new(token_service: Arc<TokenService>, clients: Arc<dyn ClientRegistry>) -> Self {
        Self {
            token_service,
            clients,
        }
    }
}

/// Form body of a revocation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke.
    #[serde(default)]
    pub token: Option<String>,

    /// `access_token` or `refresh_token`.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    /// Client identifier (public clients and `client_secret_post`).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (`client_secret_post`).
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Handler for `POST /revoke`.
///
/// # Responses
///
/// - 200 once the token is revoked or was never valid for this client
/// - 400 `invalid_request` when `token` is missing or the body is unreadable
/// - 401 `invalid_client` on authentication failure
/// - 500 when the store is unavailable
pub async fn revoke_handler(
    State(state): State<RevocationState>,
    headers: HeaderMap,
    request: Result<Form<RevocationRequest>, FormRejection>,
) -> Response {
    let request = match request {
        Ok(Form(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Malformed revocation request body");
            return error_response(&form_rejection_error(&rejection));
        }
    };
    let basic = basic_credentials(&headers);
    let body = BodyCredentials {
        client_id: request.client_id.as_deref(),
        client_secret: request.client_secret.as_deref(),
    };

    let client = match authenticate_client(
        body,
        basic.as_ref().map(|(id, secret)| (id.as_str(), secret.as_str())),
        state.clients.as_ref(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Revocation client authentication failed");
            return error_response(&e);
        }
    };

    let Some(token) = request.token.as_deref().filter(|t| !t.is_empty()) else {
        return error_response(&AuthError::invalid_request(
            "Missing required parameter: token",
        ));
    };

    // Unknown hints are ignored (RFC 7009 Section 2.1)
    let hint = TokenTypeHint::parse(request.token_type_hint.as_deref());
    let client_id = client.client.client_id;

    match state.token_service.revoke(token, hint, &client_id).await {
        Ok(()) => {
            info!(client_id = %client_id, hint = ?hint, "Processed revocation request");
            (StatusCode::OK, [(header::CACHE_CONTROL, "no-store")]).into_response()
        }
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "Revocation failed");
            error_response(&e)
        }
    }
}
