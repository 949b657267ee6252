//! EHR launch token issuance endpoint.
//!
//! Lets the EHR mint a launch token before redirecting the browser to a
//! SMART app. Only mounted when `launch.issuance_enabled` is set, and should
//! be reachable from the EHR network only.
//!
//! # Request Format
//!
//! ```text
//! POST /launch
//! Content-Type: application/json
//!
//! {
//!   "clientId": "growth-chart",
//!   "patient": "123",
//!   "encounter": "456",
//!   "needPatientBanner": true,
//!   "intent": "reconcile-medications"
//! }
//! ```
//!
//! # Response
//!
//! ```json
//! {
//!   "launch": "abc123...",
//!   "expiresIn": 300,
//!   "expiresAt": "2025-01-01T12:05:00Z"
//! }
//! ```
//!
//! # Flow
//!
//! 1. EHR calls POST /launch with patient/encounter context
//! 2. Server returns a single-use launch token
//! 3. EHR redirects to app with `launch=<token>` parameter
//! 4. App includes launch parameter in authorization request
//! 5. Server binds the context to the code and the token response

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error_response;
use crate::smart::launch::{FhirContextItem, IssuedLaunchToken, LaunchContext, LaunchContextManager};

// =============================================================================
// State Types
// =============================================================================

/// State required for the launch endpoint.
#[derive(Clone)]
pub struct LaunchState {
    /// Issues launch tokens.
    pub launches: LaunchContextManager,
}

impl LaunchState {
    /// Creates a new launch state.
    pub fn new(launches: LaunchContextManager) -> Self {
        Self { launches }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Request to create a launch token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLaunchRequest {
    /// Client the launch is intended for.
    pub client_id: String,

    /// Patient context (FHIR Patient resource ID).
    #[serde(default)]
    pub patient: Option<String>,

    /// Encounter context (FHIR Encounter resource ID).
    #[serde(default)]
    pub encounter: Option<String>,

    /// FHIR reference to the launching user.
    #[serde(default)]
    pub fhir_user: Option<String>,

    /// Location context.
    #[serde(default)]
    pub location: Option<String>,

    /// Organization context.
    #[serde(default)]
    pub organization: Option<String>,

    /// Additional FHIR context items.
    #[serde(default)]
    pub fhir_context: Option<Vec<FhirContextItem>>,

    /// Launch intent (e.g., "reconcile-medications").
    #[serde(default)]
    pub intent: Option<String>,

    /// Whether to display patient banner in the app.
    #[serde(default)]
    pub need_patient_banner: Option<bool>,

    /// URL to SMART styling information.
    #[serde(default)]
    pub smart_style_url: Option<String>,

    /// Tenant identifier for multi-tenant systems.
    #[serde(default)]
    pub tenant: Option<String>,

    /// Token lifetime override in seconds.
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

impl CreateLaunchRequest {
    fn into_parts(self) -> (String, LaunchContext, Option<Duration>) {
        let context = LaunchContext {
            patient: self.patient,
            encounter: self.encounter,
            fhir_user: self.fhir_user,
            location: self.location,
            organization: self.organization,
            intent: self.intent,
            smart_style_url: self.smart_style_url,
            tenant: self.tenant,
            need_patient_banner: self.need_patient_banner,
            fhir_context: self.fhir_context.unwrap_or_default(),
        };
        (
            self.client_id,
            context,
            self.ttl_seconds.map(Duration::from_secs),
        )
    }
}

/// Response from creating a launch token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLaunchResponse {
    /// Value for the `launch` authorization parameter.
    pub launch: String,

    /// Seconds until the launch token expires.
    pub expires_in: u64,

    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<IssuedLaunchToken> for CreateLaunchResponse {
    fn from(issued: IssuedLaunchToken) -> Self {
        Self {
            launch: issued.launch,
            expires_in: issued.expires_in,
            expires_at: issued.expires_at,
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Handler for `POST /launch`.
///
/// # Response
///
/// - 201 Created with a [`CreateLaunchResponse`]
/// - 400 `invalid_request` for an empty `clientId`, malformed IDs or a zero TTL
/// - 500 when the store is unavailable
pub async fn create_launch_handler(
    State(state): State<LaunchState>,
    Json(request): Json<CreateLaunchRequest>,
) -> Response {
    let (client_id, context, ttl) = request.into_parts();

    match state
        .launches
        .issue_launch_token(&client_id, context, ttl)
        .await
    {
        Ok(issued) => {
            tracing::info!(
                client_id = %client_id,
                expires_in = issued.expires_in,
                "Created launch token"
            );
            (StatusCode::CREATED, Json(CreateLaunchResponse::from(issued))).into_response()
        }
        Err(e) => {
            tracing::warn!(client_id = %client_id, error = %e, "Failed to create launch token");
            error_response(&e)
        }
    }
}
