//! Refresh token record.
//!
//! The token value is never stored. Records live in the token store under
//! the SHA-256 hash of the value (see [`crate::token::hash_token`]).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::smart::launch::LaunchContext;
use crate::smart::scopes::ScopeSet;

/// Store namespace for refresh tokens.
pub const REFRESH_NAMESPACE: &str = "refresh";

/// Stored state behind an issued refresh token.
///
/// Scope and context only ever narrow across refresh generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Client the token was issued to.
    pub client_id: String,

    /// Resource owner subject.
    pub subject: String,

    /// Scopes granted by the original authorization.
    pub scope: ScopeSet,

    /// Launch context captured at authorization time.
    #[serde(default)]
    pub context: LaunchContext,

    /// When this generation was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Absolute expiry of this generation.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl RefreshTokenRecord {
    /// Returns `true` if the token is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}
