//! Authorization code records.
//!
//! # Lifecycle
//!
//! `ISSUED -> REDEEMED | EXPIRED`. Redemption removes the record from the
//! store in the same operation that reads it, so "used" is represented by
//! absence and a code can be redeemed at most once.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::pkce::PkceChallenge;
use crate::smart::launch::LaunchContext;
use crate::smart::scopes::ScopeSet;

/// Store namespace for authorization codes.
pub const CODE_NAMESPACE: &str = "code";

/// State captured at `/authorize` and redeemed at `/token`.
///
/// Stored under the hash of the code value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Client the code was issued to.
    pub client_id: String,

    /// Redirect URI from the authorization request.
    pub redirect_uri: String,

    /// Granted scopes.
    pub scope: ScopeSet,

    /// Resource owner subject.
    pub subject: String,

    /// Launch context merged with the resource owner's selections.
    #[serde(default)]
    pub context: LaunchContext,

    /// PKCE challenge, if the request carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkce: Option<PkceChallenge>,

    /// Issue time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationCode {
    /// Returns `true` if the code is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}
