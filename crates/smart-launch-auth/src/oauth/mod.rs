//! OAuth 2.0 authorization server implementation.
//!
//! # Authorization Code Flow
//!
//! The authorization code flow is implemented across several submodules:
//!
//! - [`authorize`] - Request/response types for the authorization endpoint
//! - [`code`] - Stored authorization code records
//! - [`service`] - Authorization service with validation logic
//! - [`pkce`] - PKCE challenge/verifier implementation
//! - [`token`] - Request/response types for the token endpoint
//! - [`client_auth`] - Client authentication at the token and revocation endpoints
//!
//! # Example
//!
//! ```ignore
//! use smart_launch_auth::oauth::{PkceChallenge, PkceVerifier};
//!
//! // Client generates PKCE verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! // Server processes authorization request
//! let grant = service.handle_authorization_request(&request, Some(&owner)).await?;
//! let redirect_url = grant.redirect_url()?;
//! ```

pub mod authorize;
pub mod client_auth;
pub mod code;
pub mod pkce;
pub mod service;
pub mod token;

// Authorization endpoint types
pub use authorize::{
    AuthorizationError, AuthorizationRequest, AuthorizationResponse, AuthorizationUrlParams,
    build_authorization_url,
};

// Client authentication
pub use client_auth::{
    AuthenticatedClient, BodyCredentials, TokenEndpointAuthMethod, authenticate_client,
    parse_basic_auth,
};

// Stored codes
pub use code::{AuthorizationCode, CODE_NAMESPACE};

// PKCE types
pub use pkce::{PkceChallenge, PkceChallengeMethod, PkceError, PkceVerifier, verify_pkce};

// Service types
pub use service::{AuthorizationConfig, AuthorizationGrant, AuthorizationService, AuthorizeFailure};

// Token endpoint types
pub use token::{TokenErrorResponse, TokenGrant, TokenRequest, TokenResponse};
