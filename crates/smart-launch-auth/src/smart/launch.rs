//! SMART EHR launch context tokens.
//!
//! # Flow
//!
//! 1. The EHR calls [`LaunchContextManager::issue_launch_token`] with the
//!    clinical context of the session and hands `launch=<token>` to the app
//! 2. The app sends the same `launch` value to `/authorize`
//! 3. The authorization endpoint consumes the token and merges its context
//!    into the authorization code
//!
//! A launch token is single-use and short-lived (5 minutes by default).
//! Consumption is atomic, so a token raced by two requests is honored once.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::{NamespacedStore, TokenStore};
use crate::token::{generate_opaque_token, hash_token};
use crate::types::ResourceOwner;

/// Store namespace for launch tokens.
pub const LAUNCH_NAMESPACE: &str = "launch";

/// Default launch token lifetime.
pub const DEFAULT_LAUNCH_TOKEN_TTL: Duration = Duration::from_secs(300);

/// FHIR `id` datatype: 1-64 of `[A-Za-z0-9\-\.]`.
static FHIR_ID_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").expect("Invalid FHIR id regex"));

/// Returns `true` if `id` is a valid FHIR resource id.
#[must_use]
pub fn is_valid_fhir_id(id: &str) -> bool {
    FHIR_ID_REGEX.is_match(id)
}

// ============================================================================
// Launch Context Types
// ============================================================================

/// Clinical context established by the EHR for a launch.
///
/// Carried by value from the launch token into the authorization code and
/// from there into refresh tokens, so later changes in the EHR never leak
/// into existing grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchContext {
    /// Current patient ID (FHIR resource ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<String>,

    /// Current encounter ID (FHIR resource ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<String>,

    /// FHIR reference to the launching user.
    #[serde(
        rename = "fhirUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fhir_user: Option<String>,

    /// Current location ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Organization the session runs under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Launch intent, e.g. `reconcile-medications`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    /// URL of the EHR's SMART style sheet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_style_url: Option<String>,

    /// Tenant identifier for multi-tenant EHRs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Whether the app should render its own patient banner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_patient_banner: Option<bool>,

    /// Additional resources in context (SMART v2 `fhirContext`).
    #[serde(rename = "fhirContext", default, skip_serializing_if = "Vec::is_empty")]
    pub fhir_context: Vec<FhirContextItem>,
}

impl LaunchContext {
    /// Creates a context for one patient.
    #[must_use]
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient: Some(patient_id.into()),
            ..Self::default()
        }
    }

    /// Sets the encounter.
    #[must_use]
    pub fn with_encounter(mut self, encounter_id: impl Into<String>) -> Self {
        self.encounter = Some(encounter_id.into());
        self
    }

    /// Sets the user reference.
    #[must_use]
    pub fn with_fhir_user(mut self, fhir_user: impl Into<String>) -> Self {
        self.fhir_user = Some(fhir_user.into());
        self
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Combines this launch context with what the resource owner selected.
    ///
    /// Values established by the launch win for patient and encounter.
    /// User and organization fall back to the resource owner's identity.
    #[must_use]
    pub fn merge_requested(&self, requested: &ResourceOwner) -> LaunchContext {
        let mut merged = self.clone();
        if merged.patient.is_none() {
            merged.patient.clone_from(&requested.selected_patient);
        }
        if merged.encounter.is_none() {
            merged.encounter.clone_from(&requested.selected_encounter);
        }
        if merged.fhir_user.is_none() {
            merged.fhir_user.clone_from(&requested.fhir_user);
        }
        if merged.organization.is_none() {
            merged.organization.clone_from(&requested.organization);
        }
        merged
    }

    /// Checks that resource ids are well-formed FHIR ids.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` naming the first malformed field.
    pub fn validate(&self) -> AuthResult<()> {
        for (field, value) in [
            ("patient", &self.patient),
            ("encounter", &self.encounter),
            ("location", &self.location),
        ] {
            if let Some(id) = value
                && !is_valid_fhir_id(id)
            {
                return Err(AuthError::invalid_request(format!(
                    "{field} is not a valid FHIR id"
                )));
            }
        }
        Ok(())
    }
}

/// A resource reference in the SMART v2 `fhirContext` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FhirContextItem {
    /// FHIR resource reference (e.g., "Observation/123").
    pub reference: String,

    /// How the resource relates to the launch, e.g. `launch-context`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl FhirContextItem {
    /// Creates a new FHIR context item.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            role: None,
        }
    }

    /// Creates a new FHIR context item with a role.
    #[must_use]
    pub fn with_role(reference: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            role: Some(role.into()),
        }
    }
}

/// Stored form of a launch token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRecord {
    /// Client the launch was issued for.
    pub client_id: String,
    /// Context handed to the app on consumption.
    pub context: LaunchContext,
    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// A freshly issued launch token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedLaunchToken {
    /// Value for the `launch` parameter.
    pub launch: String,
    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

// ============================================================================
// Launch Context Manager
// ============================================================================

/// Issues and redeems launch tokens.
#[derive(Clone)]
pub struct LaunchContextManager {
    records: NamespacedStore<LaunchRecord>,
    default_ttl: Duration,
}

impl LaunchContextManager {
    /// Creates a manager over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, default_ttl: Duration) -> Self {
        Self {
            records: NamespacedStore::new(store, LAUNCH_NAMESPACE),
            default_ttl,
        }
    }

    /// Issues a single-use launch token carrying `context`.
    ///
    /// `ttl` defaults to the configured launch token lifetime, which is also
    /// the upper bound for a requested TTL.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for a malformed context or a TTL that is
    /// zero or above the configured lifetime, and
    /// a storage error if the token cannot be persisted.
    pub async fn issue_launch_token(
        &self,
        client_id: &str,
        context: LaunchContext,
        ttl: Option<Duration>,
    ) -> AuthResult<IssuedLaunchToken> {
        if client_id.is_empty() {
            return Err(AuthError::invalid_request("client_id is required"));
        }
        context.validate()?;

        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(AuthError::invalid_request("Launch token TTL must be > 0"));
        }
        if ttl > self.default_ttl {
            return Err(AuthError::invalid_request(format!(
                "Launch token TTL must not exceed {} seconds",
                self.default_ttl.as_secs()
            )));
        }

        let issued_at = OffsetDateTime::now_utc();
        let expires_at = time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add(ttl))
            .ok_or_else(|| AuthError::invalid_request("Launch token TTL is out of range"))?;
        let launch = generate_opaque_token();

        let record = LaunchRecord {
            client_id: client_id.to_string(),
            context,
            issued_at,
            expires_at,
        };
        self.records.put(&hash_token(&launch), &record, ttl).await?;

        tracing::debug!(
            client_id = %client_id,
            has_patient = record.context.patient.is_some(),
            has_encounter = record.context.encounter.is_some(),
            ttl_secs = ttl.as_secs(),
            "Issued launch token"
        );

        Ok(IssuedLaunchToken {
            launch,
            expires_at,
            expires_in: ttl.as_secs(),
        })
    }

    /// Redeems a launch token and returns the context it was issued with.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` if the token is unknown, expired or already
    /// consumed.
    pub async fn consume_launch_token(&self, launch: &str) -> AuthResult<LaunchContext> {
        Ok(self.take(launch).await?.context)
    }

    /// Redeems a launch token on behalf of `client_id`.
    ///
    /// The token is consumed even when it belongs to another client.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` if the token is unknown, expired, already
    /// consumed, or issued to a different client.
    pub async fn consume_launch_token_for_client(
        &self,
        launch: &str,
        client_id: &str,
    ) -> AuthResult<LaunchContext> {
        let record = self.take(launch).await?;
        if record.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                issued_to = %record.client_id,
                "Launch token presented by a different client"
            );
            return Err(AuthError::invalid_grant("Invalid launch token"));
        }
        Ok(record.context)
    }

    async fn take(&self, launch: &str) -> AuthResult<LaunchRecord> {
        let record = self
            .records
            .consume(&hash_token(launch))
            .await?
            .ok_or_else(|| AuthError::invalid_grant("Invalid launch token"))?;

        if OffsetDateTime::now_utc() >= record.expires_at {
            return Err(AuthError::invalid_grant("Invalid launch token"));
        }
        Ok(record)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTokenStore;

    fn manager() -> LaunchContextManager {
        LaunchContextManager::new(Arc::new(MemoryTokenStore::new()), DEFAULT_LAUNCH_TOKEN_TTL)
    }

    fn full_context() -> LaunchContext {
        LaunchContext {
            patient: Some("123".to_string()),
            encounter: Some("enc-9".to_string()),
            fhir_user: Some("Practitioner/77".to_string()),
            location: Some("ward-3".to_string()),
            organization: Some("org-1".to_string()),
            intent: Some("reconcile-medications".to_string()),
            smart_style_url: Some("https://ehr.example.com/style.json".to_string()),
            tenant: Some("t1".to_string()),
            need_patient_banner: Some(false),
            fhir_context: vec![FhirContextItem::with_role(
                "Observation/o1",
                "launch-context",
            )],
        }
    }

    #[tokio::test]
    async fn test_consume_returns_issued_context() {
        let manager = manager();
        let issued = manager
            .issue_launch_token("app", full_context(), None)
            .await
            .unwrap();

        assert_eq!(issued.launch.len(), 43);
        assert_eq!(issued.expires_in, 300);

        let context = manager.consume_launch_token(&issued.launch).await.unwrap();
        assert_eq!(context, full_context());
    }

    #[tokio::test]
    async fn test_second_consumption_fails() {
        let manager = manager();
        let issued = manager
            .issue_launch_token("app", LaunchContext::for_patient("123"), None)
            .await
            .unwrap();

        manager.consume_launch_token(&issued.launch).await.unwrap();
        let err = manager
            .consume_launch_token(&issued.launch)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_unknown_token_fails() {
        let err = manager()
            .consume_launch_token("never-issued")
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_expired_token_fails() {
        let manager = manager();
        let issued = manager
            .issue_launch_token(
                "app",
                LaunchContext::for_patient("123"),
                Some(Duration::from_millis(20)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.consume_launch_token(&issued.launch).await.is_err());
    }

    #[tokio::test]
    async fn test_other_client_cannot_consume() {
        let manager = manager();
        let issued = manager
            .issue_launch_token("app", LaunchContext::for_patient("123"), None)
            .await
            .unwrap();

        assert!(
            manager
                .consume_launch_token_for_client(&issued.launch, "other-app")
                .await
                .is_err()
        );
        // burned by the failed attempt
        assert!(
            manager
                .consume_launch_token_for_client(&issued.launch, "app")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_invalid_patient_id_rejected() {
        let err = manager()
            .issue_launch_token("app", LaunchContext::for_patient("bad id/1"), None)
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let err = manager()
            .issue_launch_token("app", LaunchContext::default(), Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_ttl_above_lifetime_rejected() {
        let manager = manager();
        let err = manager
            .issue_launch_token(
                "app",
                LaunchContext::for_patient("123"),
                Some(Duration::from_secs(u64::MAX)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");

        let err = manager
            .issue_launch_token(
                "app",
                LaunchContext::for_patient("123"),
                Some(DEFAULT_LAUNCH_TOKEN_TTL + Duration::from_secs(1)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_request");

        assert!(
            manager
                .issue_launch_token(
                    "app",
                    LaunchContext::for_patient("123"),
                    Some(DEFAULT_LAUNCH_TOKEN_TTL),
                )
                .await
                .is_ok()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumption_single_winner() {
        let manager = manager();
        let issued = manager
            .issue_launch_token("app", LaunchContext::for_patient("123"), None)
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let launch = issued.launch.clone();
                tokio::spawn(async move { manager.consume_launch_token(&launch).await.is_ok() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_merge_launch_wins_for_patient_and_encounter() {
        let launch = LaunchContext::for_patient("123").with_encounter("e1");
        let owner = ResourceOwner {
            subject: "u1".to_string(),
            organization: Some("org-9".to_string()),
            fhir_user: Some("Practitioner/1".to_string()),
            selected_patient: Some("999".to_string()),
            selected_encounter: Some("e999".to_string()),
        };

        let merged = launch.merge_requested(&owner);
        assert_eq!(merged.patient.as_deref(), Some("123"));
        assert_eq!(merged.encounter.as_deref(), Some("e1"));
        assert_eq!(merged.fhir_user.as_deref(), Some("Practitioner/1"));
        assert_eq!(merged.organization.as_deref(), Some("org-9"));
    }

    #[test]
    fn test_merge_falls_back_to_selection() {
        let owner = ResourceOwner {
            selected_patient: Some("456".to_string()),
            ..ResourceOwner::new("u1")
        };

        let merged = LaunchContext::default().merge_requested(&owner);
        assert_eq!(merged.patient.as_deref(), Some("456"));
        assert!(merged.encounter.is_none());
    }

    #[test]
    fn test_fhir_id_validation() {
        assert!(is_valid_fhir_id("123"));
        assert!(is_valid_fhir_id("a.b-C"));
        assert!(is_valid_fhir_id(&"x".repeat(64)));
        assert!(!is_valid_fhir_id(""));
        assert!(!is_valid_fhir_id(&"x".repeat(65)));
        assert!(!is_valid_fhir_id("Patient/123"));
        assert!(!is_valid_fhir_id("a_b"));
    }

    #[test]
    fn test_context_serialization_names() {
        let json = serde_json::to_value(full_context()).unwrap();
        assert_eq!(json["fhirUser"], "Practitioner/77");
        assert_eq!(json["fhirContext"][0]["reference"], "Observation/o1");
        assert_eq!(json["need_patient_banner"], false);

        let empty = serde_json::to_string(&LaunchContext::default()).unwrap();
        assert_eq!(empty, "{}");
    }
}
