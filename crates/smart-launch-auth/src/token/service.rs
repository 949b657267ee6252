//! Token service for issuing, verifying and revoking tokens.
//!
//! This module provides the token service that handles OAuth 2.0 token operations:
//!
//! - Authorization code exchange
//! - Refresh token handling (with optional rotation)
//! - Access token verification
//! - Token revocation (RFC 7009)
//!
//! # Usage
//!
//! ```ignore
//! let jwt = Arc::new(JwtService::from_config(&auth_config)?);
//! let config = TokenConfig::from_auth_config(&auth_config);
//! let service = TokenService::new(store, jwt.clone(), jwt, config);
//!
//! let response = service
//!     .exchange_code(&code, Some(&verifier), "my-app", "https://app/cb")
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::code::{AuthorizationCode, CODE_NAMESPACE};
use crate::oauth::pkce::PkceVerifier;
use crate::oauth::token::TokenResponse;
use crate::smart::launch::LaunchContext;
use crate::smart::scopes::{ScopeSet, SpecialScope};
use crate::storage::{NamespacedStore, TokenStore};
use crate::token::jwt::AccessTokenClaims;
use crate::token::signer::{Signer, Verifier};
use crate::token::{generate_opaque_token, hash_token};
use crate::types::{REFRESH_NAMESPACE, RefreshTokenRecord};

/// Store namespace for revoked access token IDs.
pub const REVOKED_JTI_NAMESPACE: &str = "revoked_jti";

const INVALID_CODE: &str = "Invalid authorization code";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Marker stored for a revoked access token `jti`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedJti {
    /// Client that revoked the token.
    pub client_id: String,
    /// Revocation time.
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,
}

/// `token_type_hint` values from RFC 7009.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    /// `access_token`
    AccessToken,
    /// `refresh_token`
    RefreshToken,
}

impl TokenTypeHint {
    /// Parses a hint. Unknown hints are ignored, as RFC 7009 allows.
    #[must_use]
    pub fn parse(hint: Option<&str>) -> Option<Self> {
        match hint {
            Some("access_token") => Some(Self::AccessToken),
            Some("refresh_token") => Some(Self::RefreshToken),
            _ => None,
        }
    }
}

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Server issuer URL (included in tokens as `iss`).
    pub issuer: String,

    /// Resource servers placed in the `aud` claim.
    pub audience: Vec<String>,

    /// Access token lifetime.
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,

    /// Whether to rotate refresh tokens on use.
    /// When true, the old token is consumed and a new one is issued.
    /// When false, the same token stays valid until it expires.
    pub rotate_refresh_tokens: bool,

    /// Issue refresh tokens when `offline_access` is granted.
    pub refresh_tokens_enabled: bool,

    /// Record and check revoked access token IDs.
    pub track_jti: bool,
}

impl TokenConfig {
    /// Creates a new token configuration with defaults.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: Vec<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience,
            access_token_lifetime: Duration::from_secs(3600),
            refresh_token_lifetime: Duration::from_secs(60 * 24 * 3600),
            rotate_refresh_tokens: true,
            refresh_tokens_enabled: true,
            track_jti: true,
        }
    }

    /// Extracts the token settings from the server configuration.
    #[must_use]
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_lifetime: config.oauth.access_token_lifetime,
            refresh_token_lifetime: config.oauth.refresh_token_lifetime,
            rotate_refresh_tokens: config.oauth.refresh_token_rotation,
            refresh_tokens_enabled: config.smart.refresh_tokens_enabled,
            track_jti: config.revocation.track_jti,
        }
    }

    /// Sets the access token lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Sets the refresh token lifetime.
    #[must_use]
    pub fn with_refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }

    /// Sets whether to rotate refresh tokens on use.
    #[must_use]
    pub fn with_rotate_refresh_tokens(mut self, rotate: bool) -> Self {
        self.rotate_refresh_tokens = rotate;
        self
    }
}

/// Token service for generating and managing OAuth tokens.
pub struct TokenService {
    codes: NamespacedStore<AuthorizationCode>,
    refresh_tokens: NamespacedStore<RefreshTokenRecord>,
    revoked: NamespacedStore<RevokedJti>,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn Verifier>,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared store holding codes, refresh tokens and revoked jtis
    /// * `signer` - Signs access tokens
    /// * `verifier` - Verifies access tokens produced by `signer`
    /// * `config` - Service configuration
    #[must_use]
    pub fn new(
        store: Arc<dyn TokenStore>,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn Verifier>,
        config: TokenConfig,
    ) -> Self {
        Self {
            codes: NamespacedStore::new(Arc::clone(&store), CODE_NAMESPACE),
            refresh_tokens: NamespacedStore::new(Arc::clone(&store), REFRESH_NAMESPACE),
            revoked: NamespacedStore::new(store, REVOKED_JTI_NAMESPACE),
            signer,
            verifier,
            config,
        }
    }

    /// Gets the service configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Public keys for verifying issued access tokens.
    #[must_use]
    pub fn jwks(&self) -> crate::token::jwt::Jwks {
        self.verifier.jwks()
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// `client_id` must already be authenticated by the caller.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` with the same description if the code is
    /// unknown, expired, already used, issued to another client or for another
    /// redirect URI, or if PKCE verification fails. Store failures are
    /// `server_error`.
    ///
    /// # Security
    ///
    /// - Authorization codes are consumed atomically (one-time use)
    /// - A failed exchange still consumes the code
    /// - Tokens are never logged
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
        client_id: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenResponse> {
        // 1. Find and consume the code (atomic one-time use)
        let Some(record) = self.codes.consume(&hash_token(code)).await? else {
            tracing::debug!(client_id = %client_id, "Unknown or already redeemed authorization code");
            return Err(AuthError::invalid_grant(INVALID_CODE));
        };

        // 2. Absolute expiry
        if record.is_expired_at(OffsetDateTime::now_utc()) {
            tracing::debug!(client_id = %client_id, "Authorization code expired");
            return Err(AuthError::invalid_grant(INVALID_CODE));
        }

        // 3. Client binding
        if record.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                issued_to = %record.client_id,
                "Authorization code presented by a different client"
            );
            return Err(AuthError::invalid_grant(INVALID_CODE));
        }

        // 4. Redirect URI must match exactly
        if record.redirect_uri != redirect_uri {
            tracing::warn!(client_id = %client_id, "redirect_uri does not match authorization request");
            return Err(AuthError::invalid_grant(INVALID_CODE));
        }

        // 5. PKCE
        match (&record.pkce, code_verifier) {
            (Some(challenge), Some(verifier)) => {
                let verifier = PkceVerifier::new(verifier.to_string())
                    .map_err(|_| AuthError::invalid_grant(INVALID_CODE))?;
                challenge.verify(&verifier)?;
            }
            (Some(_), None) => {
                tracing::debug!(client_id = %client_id, "Missing code_verifier");
                return Err(AuthError::invalid_grant(INVALID_CODE));
            }
            (None, Some(_)) => {
                tracing::debug!(client_id = %client_id, "code_verifier without a stored challenge");
                return Err(AuthError::invalid_grant(INVALID_CODE));
            }
            (None, None) => {}
        }

        // 6. Issue tokens
        let refresh_token = if self.wants_refresh_token(&record.scope) {
            Some(
                self.store_refresh_token(
                    client_id,
                    &record.subject,
                    &record.scope,
                    &record.context,
                )
                .await?,
            )
        } else {
            None
        };

        let response = self.build_response(
            &record.subject,
            client_id,
            &record.scope,
            &record.context,
            refresh_token,
        )?;

        tracing::info!(
            client_id = %client_id,
            scope = %record.scope,
            refresh_token = response.refresh_token.is_some(),
            "Exchanged authorization code"
        );
        Ok(response)
    }

    /// Issues a new access token from a refresh token.
    ///
    /// With rotation enabled the presented token is consumed and, if
    /// `offline_access` is still granted, replaced. Without rotation it stays
    /// valid and the response carries no new refresh token.
    ///
    /// `scope` may narrow the original grant; omitted means the original grant.
    ///
    /// # Errors
    ///
    /// - `invalid_grant` if the token is unknown, expired, rotated, revoked or
    ///   issued to another client
    /// - `invalid_scope` if `scope` is malformed or exceeds the original grant
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        scope: Option<&str>,
    ) -> AuthResult<TokenResponse> {
        // 1. Load (and with rotation, take) the record
        let key = hash_token(refresh_token);
        let record = if self.config.rotate_refresh_tokens {
            self.refresh_tokens.consume(&key).await?
        } else {
            self.refresh_tokens.get(&key).await?
        };
        let Some(record) = record else {
            tracing::debug!(client_id = %client_id, "Unknown, rotated or revoked refresh token");
            return Err(AuthError::invalid_grant(INVALID_REFRESH_TOKEN));
        };

        // 2. Validate
        if record.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(AuthError::invalid_grant(INVALID_REFRESH_TOKEN));
        }
        if record.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                issued_to = %record.client_id,
                "Refresh token presented by a different client"
            );
            return Err(AuthError::invalid_grant(INVALID_REFRESH_TOKEN));
        }

        // 3. Scope may only narrow
        let granted = match scope.filter(|s| !s.trim().is_empty()) {
            Some(requested) => {
                let requested = ScopeSet::parse(requested)?;
                if !requested.is_covered_by(&record.scope) {
                    return Err(AuthError::invalid_scope(
                        "Requested scope exceeds the original grant",
                    ));
                }
                requested
            }
            None => record.scope.clone(),
        };

        // 4. Rotate
        let new_refresh_token =
            if self.config.rotate_refresh_tokens && self.wants_refresh_token(&granted) {
                Some(
                    self.store_refresh_token(client_id, &record.subject, &granted, &record.context)
                        .await?,
                )
            } else {
                None
            };

        let response = self.build_response(
            &record.subject,
            client_id,
            &granted,
            &record.context,
            new_refresh_token,
        )?;

        tracing::info!(
            client_id = %client_id,
            scope = %granted,
            rotated = self.config.rotate_refresh_tokens,
            "Refreshed access token"
        );
        Ok(response)
    }

    /// Verifies an access token and checks that it has not been revoked.
    ///
    /// # Errors
    ///
    /// - `TokenExpired` if `exp` has passed
    /// - `InvalidToken` for a bad signature, issuer, audience or `iat`
    /// - `TokenRevoked` if the `jti` was revoked
    pub async fn verify_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let claims = self.verifier.verify(token)?;

        if self.config.track_jti && self.revoked.exists(&claims.jti).await? {
            tracing::debug!(client_id = %claims.client_id, "Presented access token was revoked");
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Revokes a refresh token or access token (RFC 7009).
    ///
    /// Unknown tokens, and tokens issued to other clients, are ignored so
    /// callers cannot probe token validity.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store fails.
    pub async fn revoke(
        &self,
        token: &str,
        hint: Option<TokenTypeHint>,
        client_id: &str,
    ) -> AuthResult<()> {
        let revoked = if hint == Some(TokenTypeHint::AccessToken) {
            self.revoke_access_token(token, client_id).await?
                || self.revoke_refresh_token(token, client_id).await?
        } else {
            self.revoke_refresh_token(token, client_id).await?
                || self.revoke_access_token(token, client_id).await?
        };

        if !revoked {
            tracing::debug!(client_id = %client_id, "Revocation request for unknown token");
        }
        Ok(())
    }

    async fn revoke_refresh_token(&self, token: &str, client_id: &str) -> AuthResult<bool> {
        let key = hash_token(token);
        let Some(record) = self.refresh_tokens.get(&key).await? else {
            return Ok(false);
        };

        if record.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                issued_to = %record.client_id,
                "Refusing to revoke a refresh token issued to another client"
            );
            return Ok(false);
        }

        self.refresh_tokens.consume(&key).await?;
        tracing::info!(client_id = %client_id, "Revoked refresh token");
        Ok(true)
    }

    async fn revoke_access_token(&self, token: &str, client_id: &str) -> AuthResult<bool> {
        if !self.config.track_jti {
            return Ok(false);
        }

        let Ok(claims) = self.verifier.verify(token) else {
            return Ok(false);
        };
        if claims.client_id != client_id {
            tracing::warn!(
                client_id = %client_id,
                issued_to = %claims.client_id,
                "Refusing to revoke an access token issued to another client"
            );
            return Ok(false);
        }

        let now = OffsetDateTime::now_utc();
        let remaining = claims.remaining_lifetime(now);
        if remaining.is_zero() {
            return Ok(true);
        }

        let marker = RevokedJti {
            client_id: client_id.to_string(),
            revoked_at: now,
        };
        self.revoked.put(&claims.jti, &marker, remaining).await?;
        tracing::info!(client_id = %client_id, jti = %claims.jti, "Revoked access token");
        Ok(true)
    }

    fn wants_refresh_token(&self, scope: &ScopeSet) -> bool {
        self.config.refresh_tokens_enabled && scope.has(SpecialScope::OfflineAccess)
    }

    async fn store_refresh_token(
        &self,
        client_id: &str,
        subject: &str,
        scope: &ScopeSet,
        context: &LaunchContext,
    ) -> AuthResult<String> {
        let issued_at = OffsetDateTime::now_utc();
        let token = generate_opaque_token();
        let record = RefreshTokenRecord {
            client_id: client_id.to_string(),
            subject: subject.to_string(),
            scope: scope.clone(),
            context: context.clone(),
            issued_at,
            expires_at: issued_at + self.config.refresh_token_lifetime,
        };
        self.refresh_tokens
            .put(
                &hash_token(&token),
                &record,
                self.config.refresh_token_lifetime,
            )
            .await?;
        Ok(token)
    }

    fn build_response(
        &self,
        subject: &str,
        client_id: &str,
        scope: &ScopeSet,
        context: &LaunchContext,
        refresh_token: Option<String>,
    ) -> AuthResult<TokenResponse> {
        let visible = visible_context(scope, context);
        let lifetime = self.config.access_token_lifetime;

        let claims = AccessTokenClaims::builder(&self.config.issuer, subject, client_id)
            .audience(self.config.audience.clone())
            .issued_at(OffsetDateTime::now_utc())
            .expires_in_seconds(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX))
            .scope(scope.to_string())
            .patient(visible.patient.clone())
            .encounter(visible.encounter.clone())
            .fhir_user(visible.fhir_user.clone())
            .build();

        let access_token = self.signer.sign(&claims)?;

        let mut response = TokenResponse::new(access_token, lifetime.as_secs(), scope.to_string());
        response.refresh_token = refresh_token;
        response.patient = visible.patient;
        response.encounter = visible.encounter;
        response.fhir_user = visible.fhir_user;
        response.need_patient_banner = context.need_patient_banner;
        response.smart_style_url.clone_from(&context.smart_style_url);
        response.intent.clone_from(&context.intent);
        response.tenant.clone_from(&context.tenant);
        if !context.fhir_context.is_empty() {
            response.fhir_context = Some(context.fhir_context.clone());
        }
        Ok(response)
    }
}

/// Context values released to the client under the granted scopes.
#[derive(Debug, Default, PartialEq, Eq)]
struct VisibleContext {
    patient: Option<String>,
    encounter: Option<String>,
    fhir_user: Option<String>,
}

fn visible_context(scope: &ScopeSet, context: &LaunchContext) -> VisibleContext {
    let launch = scope.has(SpecialScope::Launch);
    VisibleContext {
        patient: context
            .patient
            .clone()
            .filter(|_| launch || scope.has(SpecialScope::LaunchPatient)),
        encounter: context
            .encounter
            .clone()
            .filter(|_| launch || scope.has(SpecialScope::LaunchEncounter)),
        fhir_user: context
            .fhir_user
            .clone()
            .filter(|_| scope.has(SpecialScope::FhirUser)),
    }
}
