//! The authenticated resource owner at the authorization endpoint.

use serde::{Deserialize, Serialize};

/// Identity and context selections of the user approving an authorization.
///
/// Authentication itself happens upstream; the HTTP layer obtains this from
/// a [`crate::http::ResourceOwnerResolver`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOwner {
    /// Stable subject identifier, placed in the token `sub` claim.
    pub subject: String,

    /// Organization the user acts for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// FHIR reference to the user (e.g. `Practitioner/123`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_user: Option<String>,

    /// Patient picked during a standalone launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_patient: Option<String>,

    /// Encounter picked during a standalone launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_encounter: Option<String>,
}

impl ResourceOwner {
    /// Creates an owner with only a subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }
}
