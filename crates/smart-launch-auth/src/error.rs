//! Authorization server error types.
//!
//! Every failure surfaced by the flow controller, token service and launch
//! manager is an [`AuthError`]. Its [`AuthError::oauth_error_code`] is the
//! value written to the `error` parameter of OAuth 2.0 error responses.

use std::fmt;

use crate::oauth::pkce::PkceError;
use crate::smart::scopes::ScopeError;
use crate::storage::StoreError;
use crate::token::jwt::JwtError;

/// Errors that can occur while authorizing clients and issuing tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request is missing a parameter or is otherwise malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// Client authentication failed or the client is not registered.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization code or refresh token is invalid, expired, used or revoked.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The client is not allowed to use this grant or response type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of what the client is not allowed to do.
        message: String,
    },

    /// The grant type is not supported by this server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The response type is not supported by this server.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The requested scope is invalid, unknown, or exceeds the grant.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The resource owner or server denied the request.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// The access token is malformed or its signature or claims do not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The access token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The access token has been revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The code/token store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The server configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns `true` if this error concerns a presented access token.
    #[must_use]
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken { .. } | Self::TokenExpired | Self::TokenRevoked
        )
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidClient { .. } | Self::InvalidGrant { .. } => {
                ErrorCategory::Authentication
            }
            Self::UnauthorizedClient { .. }
            | Self::InvalidScope { .. }
            | Self::AccessDenied { .. } => ErrorCategory::Authorization,
            Self::InvalidToken { .. } | Self::TokenExpired | Self::TokenRevoked => {
                ErrorCategory::Token
            }
            Self::InvalidRequest { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnsupportedResponseType { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidToken { .. } | Self::TokenExpired | Self::TokenRevoked => {
                "invalid_token"
            }
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "server_error"
            }
        }
    }

    /// Returns a description safe to send to the client.
    ///
    /// Server errors are reduced to a generic message so store and key
    /// details never reach the caller.
    #[must_use]
    pub fn public_description(&self) -> String {
        match self {
            Self::InvalidRequest { message }
            | Self::InvalidClient { message }
            | Self::InvalidGrant { message }
            | Self::UnauthorizedClient { message }
            | Self::InvalidScope { message }
            | Self::AccessDenied { message }
            | Self::InvalidToken { message } => message.clone(),
            Self::UnsupportedGrantType { grant_type } => {
                format!("Grant type '{grant_type}' is not supported")
            }
            Self::UnsupportedResponseType { response_type } => {
                format!("Response type '{response_type}' is not supported")
            }
            Self::TokenExpired => "Token expired".to_string(),
            Self::TokenRevoked => "Token revoked".to_string(),
            Self::Storage { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "The authorization server encountered an internal error".to_string()
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<ScopeError> for AuthError {
    fn from(err: ScopeError) -> Self {
        Self::invalid_scope(err.to_string())
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            // A failed comparison never says which check failed.
            PkceError::VerificationFailed => Self::invalid_grant("Invalid authorization code"),
            other => Self::invalid_request(other.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => Self::TokenExpired,
            e if e.is_validation_error() => Self::invalid_token(e.to_string()),
            JwtError::DecodingError { message } => Self::invalid_token(message),
            other => Self::internal(other.to_string()),
        }
    }
}

/// Categories of errors for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Client or grant authentication failures.
    Authentication,
    /// Permission and scope failures.
    Authorization,
    /// Access token validation failures.
    Token,
    /// Malformed requests.
    Validation,
    /// Store failures.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Authorization => write!(f, "authorization"),
            Self::Token => write!(f, "token"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::invalid_client("client not found");
        assert_eq!(err.to_string(), "Invalid client: client not found");

        let err = AuthError::invalid_grant("expired authorization code");
        assert_eq!(err.to_string(), "Invalid grant: expired authorization code");

        let err = AuthError::TokenExpired;
        assert_eq!(err.to_string(), "Token expired");
    }

    #[test]
    fn test_error_predicates() {
        let err = AuthError::invalid_client("test");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = AuthError::TokenRevoked;
        assert!(err.is_client_error());
        assert!(err.is_token_error());

        let err = AuthError::storage("store down");
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            AuthError::invalid_client("test").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            AuthError::unauthorized_client("test").category(),
            ErrorCategory::Authorization
        );
        assert_eq!(AuthError::TokenExpired.category(), ErrorCategory::Token);
        assert_eq!(
            AuthError::storage("test").category(),
            ErrorCategory::Infrastructure
        );
    }

    #[test]
    fn test_oauth_error_code() {
        assert_eq!(
            AuthError::invalid_request("test").oauth_error_code(),
            "invalid_request"
        );
        assert_eq!(
            AuthError::invalid_grant("test").oauth_error_code(),
            "invalid_grant"
        );
        assert_eq!(
            AuthError::unauthorized_client("test").oauth_error_code(),
            "unauthorized_client"
        );
        assert_eq!(
            AuthError::access_denied("test").oauth_error_code(),
            "access_denied"
        );
        assert_eq!(
            AuthError::unsupported_grant_type("password").oauth_error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(AuthError::storage("x").oauth_error_code(), "server_error");
    }

    #[test]
    fn test_pkce_failure_is_invalid_grant() {
        let err: AuthError = PkceError::VerificationFailed.into();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert!(!err.to_string().contains("PKCE"));
    }

    #[test]
    fn test_server_error_description_is_generic() {
        let err = AuthError::storage("connection refused to 10.0.0.3:6379");
        assert!(!err.public_description().contains("10.0.0.3"));
    }
}
