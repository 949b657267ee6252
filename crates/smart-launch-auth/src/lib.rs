//! # smart-launch-auth
//!
//! OAuth 2.0 authorization server core with SMART on FHIR EHR launch.
//!
//! This crate provides:
//! - The authorization code grant with PKCE (`S256` and `plain`)
//! - SMART scope parsing and permission filtering
//! - Single-use EHR launch tokens carrying clinical context
//! - JWT access tokens and rotating opaque refresh tokens
//! - Token revocation and the SMART discovery document
//!
//! ## Overview
//!
//! Every single-use artifact (authorization codes, launch tokens, rotating
//! refresh tokens) lives in a [`storage::TokenStore`] and is redeemed with an
//! atomic consume, so concurrent redemptions can never both succeed.
//!
//! ## Modules
//!
//! - [`config`] - Authorization server configuration
//! - [`oauth`] - Authorization endpoint logic, PKCE and client authentication
//! - [`token`] - Token signing, exchange, refresh and revocation
//! - [`smart`] - SMART scopes, launch context and discovery
//! - [`storage`] - Token store and client registry
//! - [`types`] - Clients, resource owners and stored records
//! - [`http`] - Axum HTTP handlers and router

pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod smart;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{
    HeaderResourceOwnerResolver, OAuthState, ResourceOwnerResolver, TrustedHeaders, oauth_router,
};
pub use oauth::{AuthorizationRequest, AuthorizationService, PkceChallenge, PkceVerifier};
pub use smart::{LaunchContext, LaunchContextManager, ScopeSet, SmartConfiguration};
pub use storage::{ClientRegistry, InMemoryClientRegistry, MemoryTokenStore, TokenStore};
pub use token::{AccessTokenClaims, JwtService, TokenService};
pub use types::{Client, ClientValidationError, GrantType, ResourceOwner};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use smart_launch_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{
        HeaderResourceOwnerResolver, OAuthState, ResourceOwnerResolver, oauth_router,
    };
    pub use crate::oauth::{
        AuthorizationGrant, AuthorizationRequest, AuthorizationService, AuthorizeFailure,
        PkceChallenge, PkceChallengeMethod, PkceVerifier, TokenRequest, TokenResponse,
    };
    pub use crate::smart::{
        LaunchContext, LaunchContextManager, ScopeSet, SmartConfiguration, SpecialScope,
    };
    pub use crate::storage::{
        ClientRegistry, InMemoryClientRegistry, MemoryTokenStore, StoreError, TokenStore,
    };
    pub use crate::token::{
        AccessTokenClaims, JwtService, Signer, TokenConfig, TokenService, Verifier,
    };
    pub use crate::types::{Client, GrantType, ResourceOwner};
}
