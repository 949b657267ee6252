//! Resource owner resolution at the authorization endpoint.
//!
//! User authentication happens in front of this server (an EHR session,
//! a login proxy). The authorization endpoint only needs to know who the
//! authenticated user is, which a [`ResourceOwnerResolver`] extracts from the
//! incoming request.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::types::ResourceOwner;

/// Resolves the authenticated user behind an authorization request.
#[async_trait]
pub trait ResourceOwnerResolver: Send + Sync {
    /// Returns the authenticated owner, or `None` when nobody is signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity source cannot be consulted.
    async fn resolve(&self, headers: &HeaderMap) -> AuthResult<Option<ResourceOwner>>;
}

/// Header names read by [`HeaderResourceOwnerResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedHeaders {
    /// Subject of the authenticated user.
    pub subject: String,
    /// FHIR reference to the user.
    pub fhir_user: String,
    /// Organization the user acts for.
    pub organization: String,
    /// Patient picked in a standalone launch.
    pub patient: String,
    /// Encounter picked in a standalone launch.
    pub encounter: String,
}

impl Default for TrustedHeaders {
    fn default() -> Self {
        Self {
            subject: "x-forwarded-user".to_string(),
            fhir_user: "x-fhir-user".to_string(),
            organization: "x-organization".to_string(),
            patient: "x-selected-patient".to_string(),
            encounter: "x-selected-encounter".to_string(),
        }
    }
}

/// Reads the resource owner from headers set by a trusted upstream proxy.
///
/// The proxy must strip these headers from client traffic.
#[derive(Debug, Clone, Default)]
pub struct HeaderResourceOwnerResolver {
    headers: TrustedHeaders,
}

impl HeaderResourceOwnerResolver {
    /// Creates a resolver reading the given header names.
    #[must_use]
    pub fn new(headers: TrustedHeaders) -> Self {
        Self { headers }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

#[async_trait]
impl ResourceOwnerResolver for HeaderResourceOwnerResolver {
    async fn resolve(&self, headers: &HeaderMap) -> AuthResult<Option<ResourceOwner>> {
        let Some(subject) = header_value(headers, &self.headers.subject) else {
            return Ok(None);
        };

        Ok(Some(ResourceOwner {
            subject,
            organization: header_value(headers, &self.headers.organization),
            fhir_user: header_value(headers, &self.headers.fhir_user),
            selected_patient: header_value(headers, &self.headers.patient),
            selected_encounter: header_value(headers, &self.headers.encounter),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_no_subject_means_anonymous() {
        let resolver = HeaderResourceOwnerResolver::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-fhir-user", HeaderValue::from_static("Practitioner/1"));

        assert!(resolver.resolve(&headers).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolves_all_fields() {
        let resolver = HeaderResourceOwnerResolver::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", HeaderValue::from_static("user-1"));
        headers.insert("x-fhir-user", HeaderValue::from_static("Practitioner/1"));
        headers.insert("x-organization", HeaderValue::from_static("org-7"));
        headers.insert("x-selected-patient", HeaderValue::from_static("p1"));
        headers.insert("x-selected-encounter", HeaderValue::from_static("  "));

        let owner = resolver.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(owner.subject, "user-1");
        assert_eq!(owner.fhir_user.as_deref(), Some("Practitioner/1"));
        assert_eq!(owner.organization.as_deref(), Some("org-7"));
        assert_eq!(owner.selected_patient.as_deref(), Some("p1"));
        assert!(owner.selected_encounter.is_none());
    }

    #[tokio::test]
    async fn test_custom_header_names() {
        let resolver = HeaderResourceOwnerResolver::new(TrustedHeaders {
            subject: "X-Remote-User".to_string(),
            ..TrustedHeaders::default()
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-remote-user", HeaderValue::from_static("alice"));

        let owner = resolver.resolve(&headers).await.unwrap().unwrap();
        assert_eq!(owner.subject, "alice");
    }
}
