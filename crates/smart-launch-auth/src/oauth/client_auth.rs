//! Client authentication for the token and revocation endpoints.
//!
//! # Authentication Methods
//!
//! - `none` - Public clients (client_id only, PKCE protects the code)
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in request body
//!
//! # Authentication Priority
//!
//! When multiple authentication methods are present, they are tried in order:
//! 1. HTTP Basic Auth header
//! 2. client_secret_post (body parameters)
//! 3. Public client (client_id only)

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ClientRegistry;
use crate::types::Client;

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The authenticated client.
    pub client: Client,

    /// The authentication method used.
    pub auth_method: TokenEndpointAuthMethod,
}

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,

    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client credentials found in a request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyCredentials<'a> {
    /// `client_id` parameter.
    pub client_id: Option<&'a str>,
    /// `client_secret` parameter.
    pub client_secret: Option<&'a str>,
}

/// Authenticates the client behind a token or revocation request.
///
/// # Arguments
///
/// * `body` - Credentials from the form body
/// * `basic_auth` - Decoded HTTP Basic credentials, if the header was present
/// * `registry` - Registered clients
///
/// # Errors
///
/// Returns `invalid_client` if:
/// - No client credentials are provided
/// - The client is unknown or inactive
/// - The client secret is wrong
/// - A confidential client omits its secret
/// - A public client presents a secret
/// - Basic and body `client_id` disagree
pub async fn authenticate_client(
    body: BodyCredentials<'_>,
    basic_auth: Option<(&str, &str)>,
    registry: &dyn ClientRegistry,
) -> AuthResult<AuthenticatedClient> {
    // 1. Try HTTP Basic Auth first
    if let Some((client_id, client_secret)) = basic_auth {
        if let Some(body_id) = body.client_id
            && body_id != client_id
        {
            return Err(AuthError::invalid_client(
                "client_id does not match the Authorization header",
            ));
        }
        return authenticate_with_secret(
            client_id,
            client_secret,
            TokenEndpointAuthMethod::ClientSecretBasic,
            registry,
        )
        .await;
    }

    // 2. Try client_secret_post
    if let (Some(client_id), Some(client_secret)) = (body.client_id, body.client_secret) {
        return authenticate_with_secret(
            client_id,
            client_secret,
            TokenEndpointAuthMethod::ClientSecretPost,
            registry,
        )
        .await;
    }

    // 3. Try public client authentication (client_id only)
    if let Some(client_id) = body.client_id {
        return authenticate_public(client_id, registry).await;
    }

    Err(AuthError::invalid_client("No client credentials provided"))
}

async fn find_active(client_id: &str, registry: &dyn ClientRegistry) -> AuthResult<Client> {
    let client = registry
        .find_by_client_id(client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

    if !client.active {
        return Err(AuthError::invalid_client("Client is inactive"));
    }
    Ok(client)
}

async fn authenticate_with_secret(
    client_id: &str,
    client_secret: &str,
    method: TokenEndpointAuthMethod,
    registry: &dyn ClientRegistry,
) -> AuthResult<AuthenticatedClient> {
    let client = find_active(client_id, registry).await?;

    if !client.confidential {
        return Err(AuthError::invalid_client(format!(
            "Public clients cannot use {method} authentication"
        )));
    }

    if !client.verify_secret(client_secret) {
        return Err(AuthError::invalid_client("Invalid client secret"));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: method,
    })
}

async fn authenticate_public(
    client_id: &str,
    registry: &dyn ClientRegistry,
) -> AuthResult<AuthenticatedClient> {
    let client = find_active(client_id, registry).await?;

    if client.confidential {
        return Err(AuthError::invalid_client(
            "Client authentication required for confidential client",
        ));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: TokenEndpointAuthMethod::None,
    })
}

/// Parses an HTTP Basic Auth header value into (client_id, client_secret).
///
/// Returns `None` if the header is not a well-formed Basic credential.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Split on first colon (secret may contain colons)
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some((client_id.to_string(), client_secret.to_string()))
}
