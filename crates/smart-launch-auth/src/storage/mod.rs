//! Storage interfaces for authorization state.
//!
//! This module defines:
//!
//! - [`TokenStore`], a key-value store with TTL and atomic consume-once
//!   reads that holds authorization codes, launch tokens, refresh tokens
//!   and revoked `jti` values
//! - [`NamespacedStore`], a typed JSON view over one key prefix of a store
//! - [`ClientRegistry`], the client registration lookup
//!
//! # Implementations
//!
//! - [`MemoryTokenStore`] - single-process store, not shareable between instances
//! - [`InMemoryClientRegistry`] - registry built from configuration

pub mod client;
pub mod memory;
pub mod store;

pub use client::{ClientRegistry, InMemoryClientRegistry};
pub use memory::MemoryTokenStore;
pub use store::{NamespacedStore, StoreError, TokenStore};
