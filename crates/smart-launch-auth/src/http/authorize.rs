//! OAuth 2.0 authorization endpoint handler.
//!
//! # Flow
//!
//! ```text
//! GET /authorize?response_type=code&client_id=...&redirect_uri=...
//!     ├─► Unknown client or untrusted redirect_uri → 400 JSON (no redirect)
//!     ├─► Any other failure → 302 redirect_uri?error=...&state=...
//!     └─► Success → 302 redirect_uri?code=...&state=...
//! ```
//!
//! The authenticated user comes from the configured
//! [`ResourceOwnerResolver`]; this endpoint never renders a login page.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::error_response;
use super::owner::ResourceOwnerResolver;
use crate::error::AuthError;
use crate::oauth::authorize::AuthorizationRequest;
use crate::oauth::service::AuthorizationService;

/// Response header listing requested scopes that were not granted.
pub const DROPPED_SCOPES_HEADER: &str = "x-dropped-scopes";

/// State required for the authorization endpoint.
#[derive(Clone)]
pub struct AuthorizeState {
    /// Validates requests and issues codes.
    pub authorization_service: Arc<AuthorizationService>,
    /// Identifies the signed-in user.
    pub owner_resolver: Arc<dyn ResourceOwnerResolver>,
}

impl AuthorizeState {
    /// Creates a new authorize state.
    pub fn new(
        authorization_service: Arc<AuthorizationService>,
        owner_resolver: Arc<dyn ResourceOwnerResolver>,
    ) -> Self {
        Self {
            authorization_service,
            owner_resolver,
        }
    }
}

/// Handler for `GET /authorize`.
pub async fn authorize_handler(
    State(state): State<AuthorizeState>,
    headers: HeaderMap,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    debug!(
        client_id = ?request.client_id,
        has_launch = request.launch.is_some(),
        "Processing authorization request"
    );

    let owner = match state.owner_resolver.resolve(&headers).await {
        Ok(owner) => owner,
        Err(e) => {
            warn!(error = %e, "Resource owner resolution failed");
            None
        }
    };

    match state
        .authorization_service
        .handle_authorization_request(&request, owner.as_ref())
        .await
    {
        Ok(grant) => {
            let location = match grant.redirect_url() {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %e, "Failed to build authorization redirect");
                    return error_response(&AuthError::invalid_request("Invalid redirect_uri"));
                }
            };

            let mut response = found(location);
            if !grant.dropped_scopes.is_empty() {
                let dropped = grant
                    .dropped_scopes
                    .iter()
                    .map(|d| d.scope.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if let Ok(value) = HeaderValue::from_str(&dropped) {
                    response.headers_mut().insert(DROPPED_SCOPES_HEADER, value);
                }
            }
            response
        }
        Err(failure) => match failure.redirect_url() {
            Some(Ok(location)) => found(location),
            Some(Err(e)) => {
                warn!(error = %e, "Failed to build error redirect");
                error_response(failure.error())
            }
            None => error_response(failure.error()),
        },
    }
}

fn found(location: String) -> Response {
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}
