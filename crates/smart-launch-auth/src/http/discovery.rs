//! SMART configuration discovery endpoint.
//!
//! Serves `/.well-known/smart-configuration`.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use url::Url;

use crate::config::AuthConfig;
use crate::smart::SmartConfiguration;

/// State for the discovery endpoint.
#[derive(Clone)]
pub struct SmartConfigState {
    /// Pre-built document.
    pub document: Arc<SmartConfiguration>,
}

impl SmartConfigState {
    /// Builds the document once from configuration.
    #[must_use]
    pub fn new(config: &AuthConfig, base_url: &Url) -> Self {
        Self {
            document: Arc::new(SmartConfiguration::build(config, base_url)),
        }
    }
}

/// Handler for `GET /.well-known/smart-configuration`.
pub async fn smart_configuration_handler(
    State(state): State<SmartConfigState>,
) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(state.document.as_ref().clone()),
    )
}
