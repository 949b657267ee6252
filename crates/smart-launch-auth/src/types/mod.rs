//! Domain types shared across the authorization server.

pub mod client;
pub mod owner;
pub mod refresh_token;

pub use client::{Client, ClientValidationError, GrantType, hash_client_secret};
pub use owner::ResourceOwner;
pub use refresh_token::{REFRESH_NAMESPACE, RefreshTokenRecord};
