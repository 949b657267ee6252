//! JWKS endpoint HTTP handler.
//!
//! Provides the `/.well-known/jwks.json` endpoint so resource servers can
//! verify access tokens issued here.
//!
//! # References
//!
//! - [RFC 7517 - JSON Web Key](https://tools.ietf.org/html/rfc7517)

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::token::Verifier;

/// State for the JWKS endpoint.
#[derive(Clone)]
pub struct JwksState {
    /// Source of the public keys.
    pub verifier: Arc<dyn Verifier>,
}

impl JwksState {
    /// Creates a new JWKS state.
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier }
    }
}

/// Handler for `GET /.well-known/jwks.json`.
///
/// Symmetric signing keys are never published, so an HMAC deployment
/// serves an empty key set.
pub async fn jwks_handler(State(state): State<JwksState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(state.verifier.jwks()),
    )
}
